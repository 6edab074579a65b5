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

//! Discovery of source files and their grouping by month.
//!
//! The date of each file is taken from its name: IMERG files carry
//! an 8-digit `YYYYMMDD` token, GISS files a month abbreviation
//! followed by the year (`DEC2019`). Files that do not match are
//! skipped with a warning; they never stop the run.

use super::configuration::SourceKind;
use crate::constants::MONTH_ABBREVIATIONS;
use crate::errors::InputError;
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use regex::Regex;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Date extracted from a file name. `day` is known only
/// for sources with more than one file per month.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct FileKey {
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
}

/// Source files of one year grouped by month (`1..=12`),
/// each list in a reproducible order.
pub type MonthFiles = BTreeMap<u32, Vec<PathBuf>>;

/// Extracts [`FileKey`]s from file names of a given source kind.
#[derive(Clone, Debug)]
pub struct KeyExtractor {
    kind: SourceKind,
    pattern: Regex,
}

impl KeyExtractor {
    pub fn new(kind: SourceKind) -> Result<Self, InputError> {
        let pattern = match kind {
            SourceKind::Imerg => Regex::new(r"\d{8}")?,
            SourceKind::Giss => Regex::new(&format!(
                r"({})(\d{{4}})",
                MONTH_ABBREVIATIONS.join("|")
            ))?,
        };

        Ok(KeyExtractor { kind, pattern })
    }

    pub fn extract(&self, file_name: &str) -> Option<FileKey> {
        match self.kind {
            SourceKind::Imerg => {
                let token = self.pattern.find(file_name)?.as_str();
                let date = NaiveDate::parse_from_str(token, "%Y%m%d").ok()?;

                Some(FileKey {
                    year: date.year(),
                    month: date.month(),
                    day: Some(date.day()),
                })
            }
            SourceKind::Giss => {
                let captures = self.pattern.captures(file_name)?;
                let month = MONTH_ABBREVIATIONS
                    .iter()
                    .position(|abbr| *abbr == &captures[1])?;

                Some(FileKey {
                    year: captures[2].parse().ok()?,
                    month: month as u32 + 1,
                    day: None,
                })
            }
        }
    }
}

/// Lists source files of `year` found in `year_dir` and groups them by month.
///
/// Only files with the given extension are considered. Files dated in
/// another year are skipped, as are extra files of single-file-per-month
/// sources (the first one by name is used).
pub fn group_year(
    year_dir: &Path,
    year: i32,
    extension: &str,
    extractor: &KeyExtractor,
    sub_monthly_files: bool,
) -> Result<MonthFiles, InputError> {
    if !year_dir.is_dir() {
        return Err(InputError::FileNotFound(year_dir.to_path_buf()));
    }

    let mut keyed_files: Vec<(FileKey, PathBuf)> = vec![];

    for entry in fs::read_dir(year_dir)? {
        let path = entry?.path();

        let has_extension = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if !path.is_file() || !has_extension {
            continue;
        }

        let file_name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => continue,
        };

        match extractor.extract(file_name) {
            Some(key) if key.year == year => keyed_files.push((key, path)),
            Some(key) => warn!(
                "Skipping {}: dated {}-{:02} but found in the {} directory",
                path.display(),
                key.year,
                key.month,
                year
            ),
            None => warn!("{}", InputError::UnrecognisedFileName(path.clone())),
        }
    }

    keyed_files.sort();

    let mut month_files = MonthFiles::new();

    for (key, path) in keyed_files {
        let files = month_files.entry(key.month).or_insert_with(Vec::new);

        if !sub_monthly_files && !files.is_empty() {
            warn!(
                "Skipping {}: {}-{:02} already has a source file",
                path.display(),
                year,
                key.month
            );
            continue;
        }

        files.push(path);
    }

    debug!(
        "Found files for {} months of {} in {}",
        month_files.len(),
        year,
        year_dir.display()
    );

    Ok(month_files)
}

#[cfg(test)]
mod tests {
    use super::{group_year, FileKey, KeyExtractor};
    use crate::pipeline::configuration::SourceKind;
    use std::fs;

    #[test]
    fn imerg_key() {
        let extractor = KeyExtractor::new(SourceKind::Imerg).unwrap();

        assert_eq!(
            extractor.extract("3B-HHR.MS.MRG.3IMERG.20100131-S063000-E065959.0390.V07A.HDF5.nc4"),
            Some(FileKey {
                year: 2010,
                month: 1,
                day: Some(31)
            })
        );
        assert_eq!(extractor.extract("3B-HHR.MS.MRG.3IMERG.20101332-S0.nc4"), None);
        assert_eq!(extractor.extract("readme.nc4"), None);
    }

    #[test]
    fn giss_key() {
        let extractor = KeyExtractor::new(SourceKind::Giss).unwrap();

        assert_eq!(
            extractor.extract("DEC2019.aijh12iWISO_20th_MERRA2_ANL.nc"),
            Some(FileKey {
                year: 2019,
                month: 12,
                day: None
            })
        );
        assert_eq!(
            extractor.extract("JUL2020.aijh12iWISO_20th_MERRA2_ANL.nc").map(|k| k.month),
            Some(7)
        );
        assert_eq!(extractor.extract("2019.aijh12iWISO.nc"), None);
    }

    #[test]
    fn groups_in_stable_order() {
        let dir = tempfile::tempdir().unwrap();
        let names = [
            "3B-HHR.MS.MRG.3IMERG.20100202-S000000-E002959.0000.V07A.HDF5.nc4",
            "3B-HHR.MS.MRG.3IMERG.20100101-S060000-E062959.0360.V07A.HDF5.nc4",
            "3B-HHR.MS.MRG.3IMERG.20100101-S000000-E002959.0000.V07A.HDF5.nc4",
            "3B-HHR.MS.MRG.3IMERG.20091231-S000000-E002959.0000.V07A.HDF5.nc4",
            "notes.nc4",
            "3B-HHR.MS.MRG.3IMERG.20100103-S000000-E002959.0000.V07A.HDF5.txt",
        ];

        for name in names {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let extractor = KeyExtractor::new(SourceKind::Imerg).unwrap();
        let months = group_year(dir.path(), 2010, "nc4", &extractor, true).unwrap();

        assert_eq!(months.keys().copied().collect::<Vec<u32>>(), vec![1, 2]);

        let january: Vec<String> = months[&1]
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(january, vec![names[2].to_string(), names[1].to_string()]);

        let again = group_year(dir.path(), 2010, "nc4", &extractor, true).unwrap();
        assert_eq!(months, again);
    }

    #[test]
    fn single_file_per_month() {
        let dir = tempfile::tempdir().unwrap();

        for name in ["JAN2012.a.nc", "JAN2012.b.nc", "FEB2012.a.nc"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let extractor = KeyExtractor::new(SourceKind::Giss).unwrap();
        let months = group_year(dir.path(), 2012, "nc", &extractor, false).unwrap();

        assert_eq!(months[&1].len(), 1);
        assert!(months[&1][0].ends_with("JAN2012.a.nc"));
        assert_eq!(months[&2].len(), 1);

        assert!(group_year(&dir.path().join("2013"), 2013, "nc", &extractor, false).is_err());
    }
}
