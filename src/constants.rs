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

//! Module containing constants used by the pipeline.

use crate::Float;

/// Marker written into cells without a valid value.
///
/// It must never be confused with zero precipitation, so
/// all comparisons against it go through `is_nan()`.
pub const MISSING: Float = Float::NAN;

/// Region identifier that bypasses masking.
pub const GLOBAL_REGION: &str = "global";

/// Latitudes of the boundary rows inserted into masks
/// that omit the poles.
pub const SOUTH_POLE_LAT: Float = -90.0;
pub const NORTH_POLE_LAT: Float = 90.0;

/// Tolerance (in degrees) when comparing coordinates of
/// grids that should be identical.
pub const COORD_TOLERANCE: Float = 1.0e-3;

/// Month abbreviations used in single-file-per-month source names
/// (e.g. `DEC2019.aijh12iWISO_20th_MERRA2_ANL.nc`).
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Name of the array field inside the flattened value archive.
pub const ARCHIVE_FIELD: &str = "all_values";

/// Suffix appended to a region identifier to get its mask file name.
pub const MASK_FILE_SUFFIX: &str = "_mask.nc";

/// Name of the per-run status report in the output directory.
pub const SUMMARY_FILE: &str = "processing_summary.csv";

/// Accepted names of the coordinate axes, in lookup order.
pub const LAT_NAMES: [&str; 2] = ["lat", "latitude"];
pub const LON_NAMES: [&str; 2] = ["lon", "longitude"];
pub const TIME_NAME: &str = "time";
