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

//! Region masks and their application to slices.
//!
//! A mask marks with `1` the cells belonging to a region. Cells
//! outside the region become the missing marker, never zero, so they
//! cannot bias statistics computed downstream. Masks are stored without
//! the polar boundary rows present in the data grids, which have to be
//! added before the mask can be aligned with data by index.

use super::grid::{reader, GridFile};
use crate::constants::{COORD_TOLERANCE, GLOBAL_REGION, MISSING, NORTH_POLE_LAT, SOUTH_POLE_LAT};
use crate::errors::{InputError, MaskError};
use crate::Float;
use float_cmp::approx_eq;
use log::debug;
use ndarray::{s, Array1, Array2, Axis, Zip};
use std::path::Path;

const MASK_VARIABLE: &str = "mask";

/// Mask of one region as read from its mask file, shared
/// read-only by all units of that region.
#[derive(Clone, PartialEq, Debug)]
pub enum RegionMask {
    /// The global region, masking is bypassed.
    Global,

    Masked {
        region: String,
        lat: Array1<Float>,
        lon: Array1<Float>,
        inside: Array2<bool>,
    },
}

/// Mask reconciled with a particular data grid.
#[derive(Clone, PartialEq, Debug)]
pub enum AlignedMask {
    Identity,
    Cells(Array2<bool>),
}

impl RegionMask {
    /// Loads the mask of `region`. The global region needs no file.
    pub fn load(region: &str, path: Option<&Path>) -> Result<Self, MaskError> {
        let path = match path {
            Some(path) if region != GLOBAL_REGION => path,
            _ => return Ok(RegionMask::Global),
        };

        let as_mask_error = |source: InputError| MaskError::Input {
            region: region.to_string(),
            source,
        };

        let file = reader::open_file(path).map_err(as_mask_error)?;
        let (values, lat, lon) =
            reader::read_normalised_field(&file, MASK_VARIABLE, path).map_err(as_mask_error)?;

        if values.dim().0 != 1 {
            return Err(as_mask_error(InputError::UnexpectedDimensions {
                name: MASK_VARIABLE.to_string(),
                dims: vec!["time".to_string(), "lat".to_string(), "lon".to_string()],
                path: path.to_path_buf(),
            }));
        }

        // missing mask cells count as outside
        let inside = values
            .index_axis(Axis(0), 0)
            .mapv(|v| !v.is_nan() && v != 0.0);

        debug!(
            "Loaded mask of '{}' with {} of {} cells inside",
            region,
            inside.iter().filter(|&&cell| cell).count(),
            inside.len()
        );

        Ok(RegionMask::Masked {
            region: region.to_string(),
            lat,
            lon,
            inside,
        })
    }

    pub fn region(&self) -> &str {
        match self {
            RegionMask::Global => GLOBAL_REGION,
            RegionMask::Masked { region, .. } => region,
        }
    }

    /// Reconciles the mask with a data grid.
    ///
    /// A mask two latitude rows shorter than the data gets an excluded
    /// row at each pole and a mask with latitudes in the opposite order
    /// is flipped. Any other disagreement in shape or coordinates
    /// is an error.
    pub fn align_to(
        &self,
        data_lat: &Array1<Float>,
        data_lon: &Array1<Float>,
    ) -> Result<AlignedMask, MaskError> {
        let (region, lat, lon, inside) = match self {
            RegionMask::Global => return Ok(AlignedMask::Identity),
            RegionMask::Masked {
                region,
                lat,
                lon,
                inside,
            } => (region, lat, lon, inside),
        };

        let alignment_error = |mask: (usize, usize)| MaskError::Alignment {
            region: region.clone(),
            mask,
            data: (data_lat.len(), data_lon.len()),
        };

        if lon.len() != data_lon.len() {
            return Err(alignment_error(inside.dim()));
        }

        let (lat, inside) = if lat.len() == data_lat.len() {
            (lat.clone(), inside.clone())
        } else if lat.len() + 2 == data_lat.len() {
            pad_polar_rows(lat, inside)
        } else {
            return Err(alignment_error(inside.dim()));
        };

        if !coords_match(lon.iter(), data_lon) {
            return Err(alignment_error(inside.dim()));
        }

        // a mask stored north to south is flipped to follow the data
        let inside = if coords_match(lat.iter(), data_lat) {
            inside
        } else if coords_match(lat.iter().rev(), data_lat) {
            debug!("Flipping latitude rows of the '{}' mask", region);
            inside.slice(s![..;-1, ..]).to_owned()
        } else {
            return Err(alignment_error(inside.dim()));
        };

        Ok(AlignedMask::Cells(inside))
    }
}

fn coords_match<'a>(mask: impl Iterator<Item = &'a Float>, data: &Array1<Float>) -> bool {
    mask.zip(data.iter())
        .all(|(&a, &b)| approx_eq!(Float, a, b, epsilon = COORD_TOLERANCE))
}

/// Inserts an excluded row at both ends of the latitude axis.
fn pad_polar_rows(lat: &Array1<Float>, inside: &Array2<bool>) -> (Array1<Float>, Array2<bool>) {
    let ascending = lat.len() < 2 || lat[0] < lat[lat.len() - 1];
    let (first, last) = if ascending {
        (SOUTH_POLE_LAT, NORTH_POLE_LAT)
    } else {
        (NORTH_POLE_LAT, SOUTH_POLE_LAT)
    };

    let padded_lat = std::iter::once(first)
        .chain(lat.iter().copied())
        .chain(std::iter::once(last))
        .collect::<Array1<Float>>();

    let (rows, cols) = inside.dim();
    let mut padded_inside = Array2::from_elem((rows + 2, cols), false);
    padded_inside.slice_mut(s![1..rows + 1, ..]).assign(inside);

    (padded_lat, padded_inside)
}

/// Replaces every value outside the region with the missing marker.
pub fn apply(
    mut grid_file: GridFile,
    mask: &AlignedMask,
    region: &str,
) -> Result<GridFile, MaskError> {
    let cells = match mask {
        AlignedMask::Identity => return Ok(grid_file),
        AlignedMask::Cells(cells) => cells,
    };

    if cells.dim() != grid_file.grid_shape() {
        return Err(MaskError::Alignment {
            region: region.to_string(),
            mask: cells.dim(),
            data: grid_file.grid_shape(),
        });
    }

    for mut slice in grid_file.values.outer_iter_mut() {
        Zip::from(&mut slice).and(cells).for_each(|value, &inside| {
            if !inside {
                *value = MISSING;
            }
        });
    }

    Ok(grid_file)
}

#[cfg(test)]
mod tests {
    use super::{apply, AlignedMask, RegionMask};
    use crate::errors::MaskError;
    use crate::pipeline::grid::GridFile;
    use ndarray::{array, Array1, Array2, Array3};
    use std::path::PathBuf;

    fn nyc_mask() -> RegionMask {
        RegionMask::Masked {
            region: "nyc".to_string(),
            lat: array![-45.0, 0.0, 45.0],
            lon: array![0.0, 90.0],
            inside: array![[false, false], [true, false], [false, false]],
        }
    }

    fn grid_file(lat: Array1<f64>) -> GridFile {
        let rows = lat.len();

        GridFile {
            path: PathBuf::from("DEC2019.nc"),
            variable: "prec".to_string(),
            times: vec![],
            lat,
            lon: array![0.0, 90.0],
            values: Array3::from_elem((2, rows, 2), 1.5),
        }
    }

    #[test]
    fn pads_polar_rows() {
        let data_lat = array![-90.0, -45.0, 0.0, 45.0, 90.0];
        let aligned = nyc_mask().align_to(&data_lat, &array![0.0, 90.0]).unwrap();

        let expected = array![
            [false, false],
            [false, false],
            [true, false],
            [false, false],
            [false, false]
        ];
        assert_eq!(aligned, AlignedMask::Cells(expected));

        let masked = apply(grid_file(data_lat), &aligned, "nyc").unwrap();

        assert_eq!(masked.values[[0, 2, 0]], 1.5);
        assert_eq!(masked.values[[1, 2, 0]], 1.5);
        assert_eq!(masked.values.iter().filter(|v| v.is_nan()).count(), 2 * 9);
        assert!(masked.values.iter().all(|&v| v != 0.0));
    }

    #[test]
    fn same_shape_needs_no_padding() {
        let data_lat = array![-45.0, 0.0, 45.0];
        let aligned = nyc_mask().align_to(&data_lat, &array![0.0, 90.0]).unwrap();

        match aligned {
            AlignedMask::Cells(cells) => assert_eq!(cells.dim(), (3, 2)),
            AlignedMask::Identity => panic!("expected cells"),
        }
    }

    #[test]
    fn global_is_identity() {
        let global = RegionMask::load("global", None).unwrap();
        assert_eq!(global.region(), "global");

        let aligned = global.align_to(&array![0.0], &array![0.0]).unwrap();
        assert_eq!(aligned, AlignedMask::Identity);

        let file = grid_file(array![-45.0, 0.0, 45.0]);
        assert_eq!(apply(file.clone(), &aligned, "global").unwrap(), file);
    }

    #[test]
    fn misaligned_grid() {
        let result = nyc_mask().align_to(&Array1::zeros(4), &array![0.0, 90.0]);
        assert!(matches!(result, Err(MaskError::Alignment { .. })));

        let result = nyc_mask().align_to(&array![-45.0, 0.0, 45.0], &Array1::zeros(3));
        assert!(matches!(result, Err(MaskError::Alignment { .. })));

        let cells = AlignedMask::Cells(Array2::from_elem((4, 2), true));
        assert!(apply(grid_file(array![-45.0, 0.0, 45.0]), &cells, "nyc").is_err());
    }

    #[test]
    fn descending_mask_is_flipped() {
        let north_to_south = RegionMask::Masked {
            region: "nyc".to_string(),
            lat: array![45.0, 0.0, -45.0],
            lon: array![0.0, 90.0],
            inside: array![[true, false], [false, false], [false, false]],
        };

        let data_lat = array![-90.0, -45.0, 0.0, 45.0, 90.0];
        let aligned = north_to_south.align_to(&data_lat, &array![0.0, 90.0]).unwrap();

        let expected = array![
            [false, false],
            [false, false],
            [false, false],
            [true, false],
            [false, false]
        ];
        assert_eq!(aligned, AlignedMask::Cells(expected));

        let masked = apply(grid_file(data_lat), &aligned, "nyc").unwrap();
        assert_eq!(masked.values[[0, 3, 0]], 1.5);
        assert!(masked.values[[0, 1, 0]].is_nan());
    }

    #[test]
    fn shifted_coordinates() {
        let shifted_lat = nyc_mask().align_to(&array![-40.0, 5.0, 50.0], &array![0.0, 90.0]);
        assert!(matches!(shifted_lat, Err(MaskError::Alignment { .. })));

        let shifted_lon = nyc_mask().align_to(&array![-45.0, 0.0, 45.0], &array![10.0, 100.0]);
        assert!(matches!(shifted_lon, Err(MaskError::Alignment { .. })));
    }

    #[test]
    fn missing_mask_file() {
        let result = RegionMask::load("nyc", Some(PathBuf::from("no/such/nyc_mask.nc").as_path()));
        assert!(matches!(result, Err(MaskError::Input { .. })));
    }
}
