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

//! Decoding of CF-convention time coordinates.
//!
//! Source files store time as an offset from a reference date
//! (`"seconds since 1970-01-01 00:00:00"`) in one of several
//! calendars. The cadence filter only needs the time of day,
//! which does not depend on the calendar, but the month key
//! does, so dates are decoded in the calendar the file declares.

use crate::errors::InputError;
use crate::Float;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;

const SECONDS_PER_DAY: i64 = 86_400;

/// Calendars recognised in the `calendar` attribute.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Calendar {
    /// `standard`, `gregorian` and `proleptic_gregorian`,
    /// all treated as proleptic Gregorian.
    Standard,
    Julian,
    /// `noleap` or `365_day`.
    NoLeap,
    /// `all_leap` or `366_day`.
    AllLeap,
    /// `360_day`, every month has 30 days.
    Day360,
}

impl Calendar {
    pub fn from_attribute(name: &str) -> Result<Self, InputError> {
        match name.trim().to_lowercase().as_str() {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Standard),
            "julian" => Ok(Calendar::Julian),
            "noleap" | "no_leap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            other => Err(InputError::InvalidTime(format!(
                "unsupported calendar '{}'",
                other
            ))),
        }
    }

    fn is_leap(self, year: i32) -> bool {
        match self {
            Calendar::Standard => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
            Calendar::Julian => year.rem_euclid(4) == 0,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    fn days_in_month(self, year: i32, month: u32) -> u32 {
        if self == Calendar::Day360 {
            return 30;
        }

        match month {
            2 if self.is_leap(year) => 29,
            2 => 28,
            4 | 6 | 9 | 11 => 30,
            _ => 31,
        }
    }

    fn days_in_year(self, year: i32) -> i64 {
        (1..=12)
            .map(|month| i64::from(self.days_in_month(year, month)))
            .sum()
    }
}

/// Access to the time of day of a timestamp, whatever calendar
/// it comes from.
pub trait TimeOfDay {
    fn hour(&self) -> u32;
    fn minute(&self) -> u32;
}

impl TimeOfDay for chrono::NaiveDateTime {
    fn hour(&self) -> u32 {
        chrono::Timelike::hour(self)
    }

    fn minute(&self) -> u32 {
        chrono::Timelike::minute(self)
    }
}

/// Calendar-aware date and time decoded from a source file.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct CfDateTime {
    pub calendar: Calendar,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl TimeOfDay for CfDateTime {
    fn hour(&self) -> u32 {
        self.hour
    }

    fn minute(&self) -> u32 {
        self.minute
    }
}

impl CfDateTime {
    fn seconds_of_day(&self) -> i64 {
        i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second)
    }

    /// Moves the date by a (possibly negative) number of whole days.
    fn add_days(&self, days: i64) -> Result<(i32, u32, u32), InputError> {
        if self.calendar == Calendar::Standard {
            let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
                .and_then(|date| date.checked_add_signed(Duration::days(days)))
                .ok_or_else(|| {
                    InputError::InvalidTime(format!(
                        "date {}-{:02}-{:02} shifted by {} days is out of range",
                        self.year, self.month, self.day, days
                    ))
                })?;

            return Ok((date.year(), date.month(), date.day()));
        }

        let calendar = self.calendar;
        let mut year = self.year;

        // day index within the year, then shifted by whole years
        let mut ordinal: i64 = (1..self.month)
            .map(|month| i64::from(calendar.days_in_month(year, month)))
            .sum::<i64>()
            + i64::from(self.day)
            - 1
            + days;

        while ordinal < 0 {
            year -= 1;
            ordinal += calendar.days_in_year(year);
        }

        while ordinal >= calendar.days_in_year(year) {
            ordinal -= calendar.days_in_year(year);
            year += 1;
        }

        let mut month = 1;
        while ordinal >= i64::from(calendar.days_in_month(year, month)) {
            ordinal -= i64::from(calendar.days_in_month(year, month));
            month += 1;
        }

        Ok((year, month, ordinal as u32 + 1))
    }
}

/// Parsed `units` attribute of a time variable.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TimeUnits {
    seconds_per_unit: Float,
    reference: CfDateTime,
}

impl TimeUnits {
    /// Parses strings like `"hours since 2000-01-01"` or
    /// `"seconds since 1970-01-01 00:00:00 UTC"`.
    pub fn parse(units: &str, calendar: Calendar) -> Result<Self, InputError> {
        let pattern = Regex::new(
            r"^\s*(\w+)\s+since\s+(-?\d{1,4})-(\d{1,2})-(\d{1,2})(?:[ T](\d{1,2}):(\d{1,2})(?::(\d{1,2}))?)?",
        )?;

        let captures = pattern
            .captures(units)
            .ok_or_else(|| InputError::InvalidTime(format!("unexpected time units '{}'", units)))?;

        let seconds_per_unit = match captures[1].to_lowercase().as_str() {
            "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
            "minutes" | "minute" | "mins" | "min" => 60.0,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
            "days" | "day" | "d" => 86_400.0,
            other => {
                return Err(InputError::InvalidTime(format!(
                    "unsupported time unit '{}'",
                    other
                )))
            }
        };

        let number = |index: usize| -> Result<i64, InputError> {
            captures.get(index).map_or(Ok(0), |m| {
                m.as_str()
                    .parse::<i64>()
                    .map_err(|err| InputError::InvalidTime(err.to_string()))
            })
        };

        let reference = CfDateTime {
            calendar,
            year: number(2)? as i32,
            month: number(3)? as u32,
            day: number(4)? as u32,
            hour: number(5)? as u32,
            minute: number(6)? as u32,
            second: number(7)? as u32,
        };

        if !(1..=12).contains(&reference.month)
            || reference.day < 1
            || reference.day > calendar.days_in_month(reference.year, reference.month)
            || reference.hour > 23
            || reference.minute > 59
            || reference.second > 59
        {
            return Err(InputError::InvalidTime(format!(
                "invalid reference date in '{}'",
                units
            )));
        }

        Ok(TimeUnits {
            seconds_per_unit,
            reference,
        })
    }

    /// Converts one stored offset into a date in the reference calendar.
    pub fn decode(&self, offset: Float) -> Result<CfDateTime, InputError> {
        if !offset.is_finite() {
            return Err(InputError::InvalidTime(format!(
                "non-finite time offset {}",
                offset
            )));
        }

        let offset_seconds = (offset * self.seconds_per_unit).round() as i64;
        let total_seconds = self.reference.seconds_of_day() + offset_seconds;

        let days = total_seconds.div_euclid(SECONDS_PER_DAY);
        let seconds_of_day = total_seconds.rem_euclid(SECONDS_PER_DAY);

        let (year, month, day) = self.reference.add_days(days)?;

        Ok(CfDateTime {
            calendar: self.reference.calendar,
            year,
            month,
            day,
            hour: (seconds_of_day / 3600) as u32,
            minute: ((seconds_of_day % 3600) / 60) as u32,
            second: (seconds_of_day % 60) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Calendar, CfDateTime, TimeUnits};

    fn ymdhm(t: CfDateTime) -> (i32, u32, u32, u32, u32) {
        (t.year, t.month, t.day, t.hour, t.minute)
    }

    #[test]
    fn imerg_seconds_since_epoch() {
        let units =
            TimeUnits::parse("seconds since 1970-01-01 00:00:00 UTC", Calendar::Julian).unwrap();

        // 2010-01-01 06:30 in the Julian calendar is 13 days behind Gregorian
        let t = units.decode(1_262_327_400.0).unwrap();
        assert_eq!((t.hour, t.minute), (6, 30));

        let units =
            TimeUnits::parse("seconds since 1970-01-01 00:00:00", Calendar::Standard).unwrap();
        let t = units.decode(1_262_327_400.0).unwrap();
        assert_eq!(ymdhm(t), (2010, 1, 1, 6, 30));
    }

    #[test]
    fn noleap_skips_february_29() {
        let units = TimeUnits::parse("days since 2000-02-28", Calendar::NoLeap).unwrap();
        assert_eq!(ymdhm(units.decode(1.0).unwrap()), (2000, 3, 1, 0, 0));

        let units = TimeUnits::parse("days since 2000-02-28", Calendar::Standard).unwrap();
        assert_eq!(ymdhm(units.decode(1.0).unwrap()), (2000, 2, 29, 0, 0));
    }

    #[test]
    fn fractional_and_negative_offsets() {
        let units = TimeUnits::parse("hours since 2001-01-01 12:00", Calendar::Day360).unwrap();
        assert_eq!(ymdhm(units.decode(-13.5).unwrap()), (2000, 12, 30, 22, 30));
        assert_eq!(ymdhm(units.decode(24.0 * 360.0).unwrap()), (2002, 1, 1, 12, 0));

        let units = TimeUnits::parse("days since 1999-12-31", Calendar::AllLeap).unwrap();
        assert_eq!(ymdhm(units.decode(60.25).unwrap()), (2000, 2, 29, 6, 0));
    }

    #[test]
    fn rejects_malformed_units() {
        assert!(TimeUnits::parse("fortnights since 2000-01-01", Calendar::Standard).is_err());
        assert!(TimeUnits::parse("hours after 2000-01-01", Calendar::Standard).is_err());
        assert!(TimeUnits::parse("days since 2001-02-29", Calendar::NoLeap).is_err());
        assert!(Calendar::from_attribute("mayan").is_err());
        assert_eq!(
            Calendar::from_attribute("365_day").unwrap(),
            Calendar::NoLeap
        );
    }
}
