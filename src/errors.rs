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

//! Error types used across the pipeline.
//!
//! Errors are grouped by the stage that raises them so the driver
//! can decide whether a failure is run-fatal (`PipelineError`) or only
//! ends the current (year, month, region) unit (`UnitError`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot set the memory limit of {0} MB")]
    MemoryLimit(usize),

    #[error("Regridding requested but target grid is unusable: {0}")]
    TargetGrid(#[source] InputError),

    #[error("Output location is unusable: {0}")]
    Output(#[from] OutputError),

    #[error("Error while handling files: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open configuration file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize configuration file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds: {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Variable '{name}' not found in {}", path.display())]
    MissingVariable { name: String, path: PathBuf },

    #[error("Coordinate '{name}' not found in {}", path.display())]
    MissingCoordinate { name: &'static str, path: PathBuf },

    #[error("Variable '{name}' in {} has unsupported dimensions {dims:?}", path.display())]
    UnexpectedDimensions {
        name: String,
        dims: Vec<String>,
        path: PathBuf,
    },

    #[error("Cannot decode time: {0}")]
    InvalidTime(String),

    #[error("File name does not carry a recognised date: {}", .0.display())]
    UnrecognisedFileName(PathBuf),

    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Cannot read npz archive: {0}")]
    Archive(#[from] ndarray_npy::ReadNpzError),

    #[error("Invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Error while listing files: {0}")]
    Io(#[from] std::io::Error),
}

impl InputError {
    /// Missing resources, as opposed to files that exist but cannot be used.
    pub fn is_missing_resource(&self) -> bool {
        matches!(self, InputError::FileNotFound(_))
    }
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Searched array is empty")]
    EmptyArray,

    #[error("Searched value is outside of the array bounds")]
    OutOfBounds,
}

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Mask for region '{region}' is unusable: {source}")]
    Input {
        region: String,
        #[source]
        source: InputError,
    },

    #[error("Mask for region '{region}' has shape {mask:?} which does not match data shape {data:?}")]
    Alignment {
        region: String,
        mask: (usize, usize),
        data: (usize, usize),
    },
}

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Slice shape {got:?} differs from the shape {expected:?} of earlier slices")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write netCDF file: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Cannot write npz archive: {0}")]
    Npz(#[from] ndarray_npy::WriteNpzError),

    #[error("Cannot write run summary: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum UnitError {
    #[error("No slices contributed to this month")]
    EmptyAggregate,

    #[error("Unit abandoned after cancellation")]
    Cancelled,

    #[error("Unit exceeded its deadline of {0} s")]
    TimedOut(u64),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl UnitError {
    /// Only deadline overruns are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UnitError::TimedOut(_))
    }
}
