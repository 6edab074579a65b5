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

//! Conversion of precipitation values to the output unit.

use super::grid::GridFile;
use crate::Float;

/// Multiplies every value by `factor` (e.g. `24` for mm/h to mm/day).
///
/// Missing values stay missing as NaN propagates through the product.
pub fn convert(mut grid_file: GridFile, factor: Float) -> GridFile {
    if factor != 1.0 {
        grid_file.values.mapv_inplace(|v| v * factor);
    }

    grid_file
}
