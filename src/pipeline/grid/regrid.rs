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

//! Nearest-neighbour remapping of slices onto the target grid.
//!
//! Both grids are rectilinear, so the nearest source cell is found
//! independently along latitude and longitude. A target coordinate
//! is covered by the source when it lies within the source coordinate
//! range extended by half a cell at each end; uncovered target cells
//! get the missing marker instead of an extrapolated value.

use super::bisection;
use super::{GridFile, TargetGrid};
use crate::constants::MISSING;
use crate::errors::SearchError;
use crate::Float;
use log::debug;
use ndarray::{s, Array1, Array3};

/// Remaps all slices of a file onto the target grid.
///
/// The output shape depends only on the target grid.
pub fn remap(grid_file: GridFile, target: &TargetGrid) -> GridFile {
    let lat_lookup = nearest_indices(&grid_file.lat, &target.lat);
    let lon_lookup = nearest_indices(&grid_file.lon, &target.lon);

    debug!(
        "Regridding {} from {:?} to {:?}",
        grid_file.path.display(),
        grid_file.grid_shape(),
        target.shape()
    );

    let slices = grid_file.slice_count();
    let mut values = Array3::from_elem((slices, target.lat.len(), target.lon.len()), MISSING);

    for (target_i, source_i) in lat_lookup.iter().enumerate() {
        let source_i = match source_i {
            Some(index) => *index,
            None => continue,
        };

        for (target_j, source_j) in lon_lookup.iter().enumerate() {
            if let Some(source_j) = source_j {
                values
                    .slice_mut(s![.., target_i, target_j])
                    .assign(&grid_file.values.slice(s![.., source_i, *source_j]));
            }
        }
    }

    GridFile {
        lat: target.lat.clone(),
        lon: target.lon.clone(),
        values,
        ..grid_file
    }
}

/// For every target coordinate finds the index of the
/// nearest source coordinate, `None` when it is not covered.
fn nearest_indices(source: &Array1<Float>, target: &Array1<Float>) -> Vec<Option<usize>> {
    let source = source.to_vec();

    target
        .iter()
        .map(|&coord| match bisection::find_nearest(&source, coord) {
            Ok(index) => Some(index),
            Err(SearchError::OutOfBounds) => edge_index_within_half_cell(&source, coord),
            Err(SearchError::EmptyArray) => None,
        })
        .collect()
}

/// Target coordinates just past the outermost source coordinates
/// still fall into the outermost source cells.
///
/// A single-point source axis has no spacing to derive a cell
/// from, so only its exact coordinate is covered.
fn edge_index_within_half_cell(source: &[Float], coord: Float) -> Option<usize> {
    if source.len() < 2 || coord.is_nan() {
        return None;
    }

    let last = source.len() - 1;
    let first_half_cell = (source[1] - source[0]).abs() / 2.0;
    let last_half_cell = (source[last] - source[last - 1]).abs() / 2.0;

    if (coord - source[0]).abs() <= first_half_cell {
        Some(0)
    } else if (coord - source[last]).abs() <= last_half_cell {
        Some(last)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{nearest_indices, remap};
    use crate::pipeline::grid::{GridFile, TargetGrid};
    use ndarray::{array, Array1, Array3};
    use std::path::PathBuf;

    fn fine_file() -> GridFile {
        // 4x4 grid at 1 degree spacing, values encode the cell position
        let lat = array![-1.5, -0.5, 0.5, 1.5];
        let lon = array![10.5, 11.5, 12.5, 13.5];
        let values = Array3::from_shape_fn((2, 4, 4), |(t, i, j)| (100 * t + 10 * i + j) as f64);

        GridFile {
            path: PathBuf::from("fine.nc4"),
            variable: "precipitation".to_string(),
            times: vec![],
            lat,
            lon,
            values,
        }
    }

    #[test]
    fn half_cell_coverage() {
        let source = array![-89.75, -89.25, 89.25, 89.75];
        let target = array![-90.0, -89.5, 89.8, 90.0, 90.5];

        assert_eq!(
            nearest_indices(&source, &target),
            vec![Some(0), Some(0), Some(3), Some(3), None]
        );
    }

    #[test]
    fn single_point_source() {
        let source = array![10.0];
        let target = array![9.9, 10.0, 10.1];

        assert_eq!(nearest_indices(&source, &target), vec![None, Some(0), None]);
        assert_eq!(nearest_indices(&Array1::zeros(0), &target), vec![None, None, None]);
    }

    #[test]
    fn coarse_target() {
        let target = TargetGrid {
            lat: array![-1.0, 1.0],
            lon: array![11.0, 13.0, 15.0],
        };

        let remapped = remap(fine_file(), &target);

        assert_eq!(remapped.values.dim(), (2, 2, 3));
        assert_eq!(remapped.lat, target.lat);
        // lat -1.0 is halfway between -1.5 and -0.5, lower index wins
        assert_eq!(remapped.values[[0, 0, 0]], 0.0);
        assert_eq!(remapped.values[[0, 1, 1]], 22.0);
        assert_eq!(remapped.values[[1, 1, 0]], 120.0);
        // lon 15.0 is beyond the last source cell
        assert!(remapped.values[[0, 0, 2]].is_nan());
        assert!(remapped.values[[1, 1, 2]].is_nan());
    }

    #[test]
    fn shape_depends_only_on_target() {
        let target = TargetGrid {
            lat: Array1::linspace(-2.0, 2.0, 9),
            lon: Array1::linspace(10.0, 14.0, 5),
        };

        let fine = remap(fine_file(), &target);

        let mut coarse = fine_file();
        coarse.lat = array![0.0];
        coarse.lon = array![12.0];
        coarse.values = Array3::zeros((2, 1, 1));
        let coarse = remap(coarse, &target);

        assert_eq!(fine.values.dim(), coarse.values.dim());
        assert_eq!(coarse.values.iter().filter(|v| !v.is_nan()).count(), 2);
    }
}
