/*
Copyright 2024 Jakub Lewandowski

This file is part of Gridded Precipitation Aggregation System (GPAS).

Gridded Precipitation Aggregation System (GPAS) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Gridded Precipitation Aggregation System (GPAS) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Gridded Precipitation Aggregation System (GPAS). If not, see https://www.gnu.org/licenses/.
*/

//! Monthly aggregation of transformed slices.
//!
//! For every (year, month, region) unit slices are folded one at
//! a time, so a unit never holds more than one source file in memory
//! besides the growing flattened archive. The fold keeps a running sum
//! and count of non-missing values per cell from which the mean grid
//! is computed at the end.

pub mod writer;

use super::grid::GridFile;
use crate::{constants::MISSING, errors::AggregateError, Float};
use ndarray::{Array1, Array2, Zip};

/// Key of a single processing unit.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
    pub region: String,
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02} {}", self.year, self.month, self.region)
    }
}

/// Accumulated state of one unit.
#[derive(Clone, PartialEq, Debug)]
pub struct MonthlyAggregate {
    pub key: MonthKey,
    pub variable: String,
    lat: Array1<Float>,
    lon: Array1<Float>,
    flattened: Vec<Float>,
    sum: Array2<Float>,
    count: Array2<u32>,
    slices: usize,
}

impl MonthlyAggregate {
    pub fn new(key: MonthKey, variable: &str) -> Self {
        MonthlyAggregate {
            key,
            variable: variable.to_string(),
            lat: Array1::zeros(0),
            lon: Array1::zeros(0),
            flattened: Vec::new(),
            sum: Array2::zeros((0, 0)),
            count: Array2::zeros((0, 0)),
            slices: 0,
        }
    }

    /// Folds all slices of a transformed file into the aggregate.
    ///
    /// The first folded slice fixes the grid of the unit; later
    /// slices on a different grid are rejected.
    pub fn fold(&mut self, grid_file: GridFile) -> Result<(), AggregateError> {
        let shape = grid_file.grid_shape();

        if self.is_empty() {
            self.lat = grid_file.lat;
            self.lon = grid_file.lon;
            self.sum = Array2::zeros(shape);
            self.count = Array2::zeros(shape);
        } else if self.sum.dim() != shape {
            return Err(AggregateError::ShapeMismatch {
                expected: self.sum.dim(),
                got: shape,
            });
        }

        self.flattened.reserve(grid_file.values.len());

        for slice in grid_file.values.outer_iter() {
            self.flattened.extend(slice.iter());

            Zip::from(&mut self.sum)
                .and(&mut self.count)
                .and(&slice)
                .for_each(|sum, count, &value| {
                    if !value.is_nan() {
                        *sum += value;
                        *count += 1;
                    }
                });

            self.slices += 1;
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slices == 0
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    pub fn lat(&self) -> &Array1<Float> {
        &self.lat
    }

    pub fn lon(&self) -> &Array1<Float> {
        &self.lon
    }

    /// Concatenation of all folded slices, missing markers included.
    pub fn flattened(&self) -> &[Float] {
        &self.flattened
    }

    pub fn non_missing(&self) -> usize {
        self.flattened.iter().filter(|v| !v.is_nan()).count()
    }

    /// Elementwise mean over slices ignoring missing values.
    ///
    /// Cells missing in every slice stay missing.
    pub fn mean_grid(&self) -> Array2<Float> {
        Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|&sum, &count| {
                if count == 0 {
                    MISSING
                } else {
                    sum / Float::from(count)
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{MonthKey, MonthlyAggregate};
    use crate::errors::AggregateError;
    use crate::pipeline::grid::GridFile;
    use float_cmp::assert_approx_eq;
    use ndarray::{array, Array3};
    use std::path::PathBuf;

    const NAN: f64 = f64::NAN;

    fn key() -> MonthKey {
        MonthKey {
            year: 2015,
            month: 7,
            region: "global".to_string(),
        }
    }

    fn grid_file(values: Array3<f64>) -> GridFile {
        let (_, rows, cols) = values.dim();

        GridFile {
            path: PathBuf::from("JUL2015.nc"),
            variable: "prec".to_string(),
            times: vec![],
            lat: ndarray::Array1::linspace(-10.0, 10.0, rows),
            lon: ndarray::Array1::linspace(0.0, 20.0, cols),
            values,
        }
    }

    #[test]
    fn missing_propagates_to_mean() {
        let mut aggregate = MonthlyAggregate::new(key(), "precipitation");
        aggregate
            .fold(grid_file(array![[[1.0, NAN], [NAN, 0.0]], [[3.0, NAN], [2.0, 0.0]]]))
            .unwrap();

        let mean = aggregate.mean_grid();

        assert_approx_eq!(f64, mean[[0, 0]], 2.0);
        assert!(mean[[0, 1]].is_nan());
        assert_approx_eq!(f64, mean[[1, 0]], 2.0);
        assert_eq!(mean[[1, 1]], 0.0);

        assert_eq!(aggregate.slices(), 2);
        assert_eq!(aggregate.non_missing(), 5);
    }

    #[test]
    fn flattens_in_fold_order() {
        let mut aggregate = MonthlyAggregate::new(key(), "precipitation");
        aggregate.fold(grid_file(array![[[1.0, 2.0]]])).unwrap();
        aggregate
            .fold(grid_file(array![[[3.0, NAN]], [[5.0, 6.0]]]))
            .unwrap();

        let flattened = aggregate.flattened();

        assert_eq!(flattened.len(), 6);
        assert_eq!(&flattened[..3], &[1.0, 2.0, 3.0]);
        assert!(flattened[3].is_nan());
        assert_eq!(&flattened[4..], &[5.0, 6.0]);
    }

    #[test]
    fn rejects_shape_change() {
        let mut aggregate = MonthlyAggregate::new(key(), "precipitation");
        aggregate.fold(grid_file(Array3::zeros((1, 2, 3)))).unwrap();

        let result = aggregate.fold(grid_file(Array3::zeros((1, 3, 2))));

        assert!(matches!(
            result,
            Err(AggregateError::ShapeMismatch {
                expected: (2, 3),
                got: (3, 2)
            })
        ));
        assert_eq!(aggregate.slices(), 1);
    }

    #[test]
    fn empty_aggregate() {
        let aggregate = MonthlyAggregate::new(key(), "precipitation");

        assert!(aggregate.is_empty());
        assert_eq!(aggregate.key.to_string(), "2015-07 global");
    }
}
