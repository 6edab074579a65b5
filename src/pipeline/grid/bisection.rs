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

//! Module containg methods for conducting
//! binary search (bisection) of elements closest
//! to searched values in coordinate vectors.

use crate::errors::SearchError;
use crate::Float;

/// Core bisection function, simply an implementation
/// of binary search algorithm adapted to searching values
/// in-between the set items.
///
/// Returns the index of the first item at or past `x` in the
/// direction the array is sorted, so that `x` lies between
/// items `found - 1` and `found`. Works for both ascending
/// and descending coordinate vectors.
fn binary_search<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let (first, last) = match (array.first(), array.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SearchError::EmptyArray),
    };

    // incomparable values (NaN) fail both containment tests
    let within = (first <= x && x <= last) || (last <= x && x <= first);
    if !within {
        return Err(SearchError::OutOfBounds);
    }

    let mut lo = 0;
    let mut hi = array.len() - 1;

    // if the array is sorted descendingly we use a function with reversed signs
    if first < last {
        while lo < hi {
            let mid = (lo + hi) / 2;

            if array[mid] >= *x {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    } else {
        while lo < hi {
            let mid = (lo + hi) / 2;

            if array[mid] <= *x {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
    }

    Ok(lo)
}

/// Finds the index of the item nearest to `x`.
///
/// When `x` is exactly halfway between two items
/// the one with the lower index is returned.
pub fn find_nearest(array: &[Float], x: Float) -> Result<usize, SearchError> {
    let found_index = binary_search(array, &x)?;

    if found_index == 0 {
        return Ok(0);
    }

    let left_distance = (x - array[found_index - 1]).abs();
    let right_distance = (array[found_index] - x).abs();

    if left_distance <= right_distance {
        Ok(found_index - 1)
    } else {
        Ok(found_index)
    }
}

#[cfg(test)]
mod tests {
    use super::find_nearest;
    use crate::errors::SearchError;

    #[test]
    fn ascending() {
        let lats = [-1.5, -0.5, 0.5, 1.5];

        assert_eq!(find_nearest(&lats, -1.5), Ok(0));
        assert_eq!(find_nearest(&lats, -0.9), Ok(1));
        assert_eq!(find_nearest(&lats, 0.4), Ok(2));
        assert_eq!(find_nearest(&lats, 1.5), Ok(3));
    }

    #[test]
    fn descending() {
        let lats = [1.5, 0.5, -0.5, -1.5];

        assert_eq!(find_nearest(&lats, 1.4), Ok(0));
        assert_eq!(find_nearest(&lats, -0.9), Ok(2));
        assert_eq!(find_nearest(&lats, -1.5), Ok(3));
    }

    #[test]
    fn ties_go_to_lower_index() {
        assert_eq!(find_nearest(&[0.0, 1.0], 0.5), Ok(0));
        assert_eq!(find_nearest(&[1.0, 0.0], 0.5), Ok(0));
    }

    #[test]
    fn out_of_bounds() {
        let lons = [0.0, 2.5, 5.0];

        assert_eq!(find_nearest(&lons, -0.1), Err(SearchError::OutOfBounds));
        assert_eq!(find_nearest(&lons, 5.1), Err(SearchError::OutOfBounds));
        assert_eq!(find_nearest(&lons, f64::NAN), Err(SearchError::OutOfBounds));
        assert_eq!(find_nearest(&[], 1.0), Err(SearchError::EmptyArray));
        assert_eq!(find_nearest(&[3.0], 3.0), Ok(0));
    }
}
