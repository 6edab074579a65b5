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

//! Module with types describing gridded data
//! flowing through the pipeline and methods for
//! reading and remapping it.

mod bisection;
pub mod calendar;
pub mod reader;
pub mod regrid;

use self::calendar::CfDateTime;
use crate::Float;
use ndarray::{Array1, Array3};
use std::path::PathBuf;

/// Values of a single variable read from one source file.
///
/// Values are always stored as `(slice, lat, lon)`; a file without
/// a time dimension holds exactly one slice. Transformations consume
/// the struct and return a new one, so a file is never shared
/// between regions.
#[derive(Clone, PartialEq, Debug)]
pub struct GridFile {
    pub path: PathBuf,
    pub variable: String,
    /// Decoded timestamps, empty when the file has no usable time variable.
    pub times: Vec<CfDateTime>,
    pub lat: Array1<Float>,
    pub lon: Array1<Float>,
    pub values: Array3<Float>,
}

impl GridFile {
    pub fn slice_count(&self) -> usize {
        self.values.dim().0
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }

    /// Timestamp deciding whether the file passes the cadence filter.
    pub fn first_time(&self) -> Option<&CfDateTime> {
        self.times.first()
    }
}

/// Fixed grid onto which every slice is remapped when
/// regridding is enabled. Loaded once per run and shared
/// read-only between workers.
#[derive(Clone, PartialEq, Debug)]
pub struct TargetGrid {
    pub lat: Array1<Float>,
    pub lon: Array1<Float>,
}

impl TargetGrid {
    pub fn shape(&self) -> (usize, usize) {
        (self.lat.len(), self.lon.len())
    }
}
