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

//! Temporal cadence filter.
//!
//! Only the hour and minute of a timestamp are compared, never its
//! distance from an epoch, so the decision is the same in every calendar.

use super::grid::calendar::TimeOfDay;

/// Decides whether a slice stamped with `timestamp` is retained
/// when observations are wanted every `rate` hours.
///
/// With the filter disabled (`rate` is `None`) everything is retained.
pub fn retain<T: TimeOfDay>(rate: Option<u32>, timestamp: &T) -> bool {
    match rate {
        None => true,
        Some(0) => false,
        Some(rate) => timestamp.hour() % rate == 0 && timestamp.minute() == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::retain;
    use crate::pipeline::grid::calendar::{Calendar, CfDateTime};
    use chrono::NaiveDate;

    fn stamp(calendar: Calendar, hour: u32, minute: u32) -> CfDateTime {
        CfDateTime {
            calendar,
            year: 2012,
            month: 2,
            day: 29,
            hour,
            minute,
            second: 0,
        }
    }

    #[test]
    fn retains_on_cadence_in_every_calendar() {
        let calendars = [
            Calendar::Standard,
            Calendar::Julian,
            Calendar::NoLeap,
            Calendar::AllLeap,
            Calendar::Day360,
        ];

        for rate in 1..=24 {
            for hour in 0..24 {
                for minute in [0, 30] {
                    let expected = hour % rate == 0 && minute == 0;

                    let naive = NaiveDate::from_ymd_opt(2012, 2, 29)
                        .unwrap()
                        .and_hms_opt(hour, minute, 0)
                        .unwrap();
                    assert_eq!(retain(Some(rate), &naive), expected);

                    for calendar in calendars {
                        assert_eq!(
                            retain(Some(rate), &stamp(calendar, hour, minute)),
                            expected
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn six_and_twelve_hourly() {
        let hours = [0, 6, 12, 18];

        let six: Vec<u32> = hours
            .into_iter()
            .filter(|&h| retain(Some(6), &stamp(Calendar::NoLeap, h, 0)))
            .collect();
        let twelve: Vec<u32> = hours
            .into_iter()
            .filter(|&h| retain(Some(12), &stamp(Calendar::NoLeap, h, 0)))
            .collect();

        assert_eq!(six, vec![0, 6, 12, 18]);
        assert_eq!(twelve, vec![0, 12]);
    }

    #[test]
    fn disabled_retains_everything() {
        assert!(retain(None, &stamp(Calendar::Standard, 5, 30)));
    }
}
