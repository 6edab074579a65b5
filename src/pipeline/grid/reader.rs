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

//! Reading of source files, region masks and target grids
//! from netCDF.
//!
//! Variables are located by name and their axes by dimension
//! name, so IMERG `(time, lon, lat)` and GISS `(time, lat, lon)`
//! layouts both end up as `(slice, lat, lon)` arrays. Packed and
//! fill values are resolved here, so the rest of the pipeline only
//! sees physical values and the missing marker.

use super::calendar::{Calendar, CfDateTime, TimeUnits};
use super::{GridFile, TargetGrid};
use crate::constants::{LAT_NAMES, LON_NAMES, MISSING, TIME_NAME};
use crate::errors::InputError;
use crate::Float;
use log::{debug, warn};
use ndarray::{Array1, Array3, ArrayD, Axis, Ix3, IxDyn};
use netcdf::AttributeValue;
use std::path::Path;

/// Opens a netCDF file, distinguishing absent files
/// from files that cannot be parsed.
pub fn open_file(path: &Path) -> Result<netcdf::File, InputError> {
    if !path.is_file() {
        return Err(InputError::FileNotFound(path.to_path_buf()));
    }

    Ok(netcdf::open(path)?)
}

/// Reads one source file with all its slices.
///
/// When `require_time` is set (cadence filtering is on) a file
/// without decodable time is rejected, otherwise time is optional.
pub fn read_grid_file(
    path: &Path,
    variable: &str,
    require_time: bool,
) -> Result<GridFile, InputError> {
    let file = open_file(path)?;

    let (values, lat, lon) = read_normalised_field(&file, variable, path)?;

    let times = match read_times(&file, path) {
        Ok(times) => times,
        Err(err) if !require_time => {
            debug!("Ignoring time of {}: {}", path.display(), err);
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    if !times.is_empty() && times.len() != values.dim().0 {
        warn!(
            "{} has {} timestamps for {} slices of '{}'",
            path.display(),
            times.len(),
            values.dim().0,
            variable
        );
    }

    Ok(GridFile {
        path: path.to_path_buf(),
        variable: variable.to_string(),
        times,
        lat,
        lon,
        values,
    })
}

/// Reads the `lat`/`lon` vectors of the regrid target.
pub fn read_target_grid(path: &Path) -> Result<TargetGrid, InputError> {
    let file = open_file(path)?;

    let lat = read_coordinate(&file, &LAT_NAMES, "lat", path)?;
    let lon = read_coordinate(&file, &LON_NAMES, "lon", path)?;

    debug!(
        "Target grid {} has shape {}x{}",
        path.display(),
        lat.len(),
        lon.len()
    );

    Ok(TargetGrid { lat, lon })
}

/// Reads a variable together with its coordinate vectors
/// and normalises its axes to `(slice, lat, lon)`.
pub fn read_normalised_field(
    file: &netcdf::File,
    name: &str,
    path: &Path,
) -> Result<(Array3<Float>, Array1<Float>, Array1<Float>), InputError> {
    let var = file
        .variable(name)
        .ok_or_else(|| InputError::MissingVariable {
            name: name.to_string(),
            path: path.to_path_buf(),
        })?;

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|dim| (dim.name(), dim.len()))
        .collect();

    let unexpected = || InputError::UnexpectedDimensions {
        name: name.to_string(),
        dims: dims.iter().map(|dim| dim.0.clone()).collect(),
        path: path.to_path_buf(),
    };

    let lat_axis = dims
        .iter()
        .position(|dim| LAT_NAMES.contains(&dim.0.as_str()));
    let lon_axis = dims
        .iter()
        .position(|dim| LON_NAMES.contains(&dim.0.as_str()));

    let (lat_axis, lon_axis) = match (lat_axis, lon_axis) {
        (Some(lat_axis), Some(lon_axis)) => (lat_axis, lon_axis),
        _ => return Err(unexpected()),
    };

    // anything that is not a spatial axis is treated as time
    let other_axes: Vec<usize> = (0..dims.len())
        .filter(|&axis| axis != lat_axis && axis != lon_axis)
        .collect();

    let shape: Vec<usize> = dims.iter().map(|dim| dim.1).collect();
    let data = read_unpacked_values(&var)?;
    let field = ArrayD::from_shape_vec(IxDyn(&shape), data)?;

    let field = match other_axes.as_slice() {
        [] => field
            .permuted_axes(vec![lat_axis, lon_axis])
            .insert_axis(Axis(0)),
        [time_axis] => field.permuted_axes(vec![*time_axis, lat_axis, lon_axis]),
        _ => return Err(unexpected()),
    };

    let values = field
        .into_dimensionality::<Ix3>()?
        .as_standard_layout()
        .into_owned();

    let lat = read_coordinate_named(file, &dims[lat_axis].0, "lat", path)?;
    let lon = read_coordinate_named(file, &dims[lon_axis].0, "lon", path)?;

    if lat.len() != values.dim().1 || lon.len() != values.dim().2 {
        return Err(unexpected());
    }

    Ok((values, lat, lon))
}

/// Reads a coordinate vector trying each alias in order.
pub fn read_coordinate(
    file: &netcdf::File,
    aliases: &[&str],
    label: &'static str,
    path: &Path,
) -> Result<Array1<Float>, InputError> {
    for &alias in aliases {
        if file.variable(alias).is_some() {
            return read_coordinate_named(file, alias, label, path);
        }
    }

    Err(InputError::MissingCoordinate {
        name: label,
        path: path.to_path_buf(),
    })
}

fn read_coordinate_named(
    file: &netcdf::File,
    name: &str,
    label: &'static str,
    path: &Path,
) -> Result<Array1<Float>, InputError> {
    let var = file
        .variable(name)
        .ok_or_else(|| InputError::MissingCoordinate {
            name: label,
            path: path.to_path_buf(),
        })?;

    Ok(Array1::from_vec(var.get_values::<Float, _>(..)?))
}

/// Reads and decodes all timestamps of the `time` variable.
fn read_times(file: &netcdf::File, path: &Path) -> Result<Vec<CfDateTime>, InputError> {
    let var = file
        .variable(TIME_NAME)
        .ok_or_else(|| InputError::MissingCoordinate {
            name: TIME_NAME,
            path: path.to_path_buf(),
        })?;

    let units = string_attribute(&var, "units").ok_or_else(|| {
        InputError::InvalidTime(format!(
            "time variable in {} has no 'units' attribute",
            path.display()
        ))
    })?;

    // CF default when the attribute is absent
    let calendar = match string_attribute(&var, "calendar") {
        Some(name) => Calendar::from_attribute(&name)?,
        None => Calendar::Standard,
    };

    let units = TimeUnits::parse(&units, calendar)?;

    var.get_values::<Float, _>(..)?
        .into_iter()
        .map(|offset| units.decode(offset))
        .collect()
}

/// Reads raw values of a variable, replacing fill values
/// with the missing marker and applying packing attributes.
fn read_unpacked_values(var: &netcdf::Variable) -> Result<Vec<Float>, InputError> {
    let fill_values: Vec<Float> = ["_FillValue", "missing_value"]
        .iter()
        .filter_map(|name| numeric_attribute(var, name))
        .collect();

    let scale_factor = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let add_offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);

    let values = var
        .get_values::<Float, _>(..)?
        .into_iter()
        .map(|v| {
            if v.is_nan() || fill_values.contains(&v) {
                MISSING
            } else {
                v * scale_factor + add_offset
            }
        })
        .collect();

    Ok(values)
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<Float> {
    let value = var.attribute_value(name)?.ok()?;

    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(Float::from(v)),
        AttributeValue::Int(v) => Some(Float::from(v)),
        AttributeValue::Short(v) => Some(Float::from(v)),
        AttributeValue::Schar(v) => Some(Float::from(v)),
        AttributeValue::Uchar(v) => Some(Float::from(v)),
        AttributeValue::Doubles(v) => v.first().copied(),
        AttributeValue::Floats(v) => v.first().map(|&v| Float::from(v)),
        _ => None,
    }
}

fn string_attribute(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}
