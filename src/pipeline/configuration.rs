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

//! Module responsible for parsing and checking the configuration file.
//!
//! To provide meaningful error messages. The configuration file uses
//! [YAML](https://en.wikipedia.org/wiki/YAML) and `serde` to enforce
//! strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use crate::constants::GLOBAL_REGION;
use crate::errors::ConfigError;
use crate::Float;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Inclusive range of years to process.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Period {
    pub start_year: i32,
    pub end_year: i32,
}

impl Period {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::OutOfBounds(
                "Start year cannot be later than end year",
            ));
        }

        Ok(())
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start_year..=self.end_year
    }
}

/// Data provider of the source files. It decides how
/// the date is encoded in file names and how many files
/// make up one month.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Half-hourly files named like
    /// `3B-HHR.MS.MRG.3IMERG.20100101-S000000-E002959.0000.V07A.HDF5.nc4`.
    Imerg,

    /// Monthly files named like `DEC2019.aijh12iWISO_20th_MERRA2_ANL.nc`.
    Giss,
}

impl SourceKind {
    fn default_extension(self) -> &'static str {
        match self {
            SourceKind::Imerg => "nc4",
            SourceKind::Giss => "nc",
        }
    }
}

/// Fields with information about the source files.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Source {
    pub kind: SourceKind,

    /// Directory with one sub-directory per year
    /// holding the source files.
    pub data_dir: PathBuf,

    /// Name of the variable extracted from source files.
    pub variable: String,

    /// _(Optional)_ Name under which the variable is written
    /// to output artifacts. Defaults to `variable`.
    #[serde(default)]
    pub output_variable: Option<String>,

    /// _(Optional)_ Extension of source files. Defaults to `nc4`
    /// for IMERG and `nc` for GISS.
    #[serde(default)]
    pub extension: Option<String>,
}

impl Source {
    pub fn output_variable(&self) -> &str {
        self.output_variable.as_deref().unwrap_or(&self.variable)
    }

    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .unwrap_or_else(|| self.kind.default_extension())
    }

    fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.variable.is_empty() || self.output_variable().is_empty() {
            return Err(ConfigError::OutOfBounds("Variable name cannot be empty"));
        }

        Ok(())
    }
}

/// Fields with the list of regions and location of their masks.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Regions {
    /// Region identifiers. Every identifier other than `global`
    /// needs a `<region>_mask.nc` file in `masks_dir`.
    pub names: Vec<String>,

    pub masks_dir: PathBuf,
}

impl Regions {
    fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.names.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one region must be requested",
            ));
        }

        let mut unique_names: FxHashSet<&str> = FxHashSet::default();

        for name in &self.names {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::OutOfBounds(
                    "Region identifier must be a non-empty file name fragment",
                ));
            }

            if !unique_names.insert(name) {
                return Err(ConfigError::OutOfBounds("Region identifiers must be unique"));
            }
        }

        Ok(())
    }
}

/// _(Optional)_ Spatial remapping onto a fixed target grid.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct Regrid {
    #[serde(default)]
    pub enabled: bool,

    /// NetCDF file with `lat` and `lon` vectors of the target grid.
    /// Required when `enabled` is set.
    #[serde(default)]
    pub target: Option<PathBuf>,
}

impl Regrid {
    fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.enabled && self.target.is_none() {
            return Err(ConfigError::OutOfBounds(
                "Regrid target must be provided when regridding is enabled",
            ));
        }

        Ok(())
    }
}

/// _(Optional)_ Temporal cadence filter.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Resample {
    #[serde(default)]
    pub enabled: bool,

    /// Interval (in hours) between retained observations.
    ///
    /// Must be between `1` and `24`. Defaults to `6`.
    #[serde(default = "Resample::default_rate")]
    pub rate: u32,
}

impl Resample {
    fn default_rate() -> u32 {
        6
    }

    fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.enabled && !(1..=24).contains(&self.rate) {
            return Err(ConfigError::OutOfBounds(
                "Resample rate must be between 1 and 24 hours",
            ));
        }

        Ok(())
    }
}

impl Default for Resample {
    fn default() -> Self {
        Resample {
            enabled: false,
            rate: Resample::default_rate(),
        }
    }
}

/// Fields with information where to write results.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Output {
    pub dir: PathBuf,
}

/// _(Optional)_ Fields with information about
/// resources available for the pipeline.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used by the pipeline.
    /// Each (year, month, region) unit runs as one task
    /// on the thread pool.
    ///
    /// Cannot be less than `1`. Defaults to `1`, which
    /// processes units one after another.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit for the pipeline in MB.
    /// Useful for enabling meaningful Out-of-memory error messages,
    /// as half-hourly fine grids are large and all slices of one unit
    /// are held until its month is folded.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,

    /// _(Optional)_ Time limit (in seconds) for one attempt
    /// at processing a unit. Checked between file reads.
    ///
    /// Cannot be less than `1`. Defaults to `3600`.
    #[serde(default = "Resources::default_unit_timeout")]
    pub unit_timeout: u64,

    /// _(Optional)_ How many times a unit that ran out of
    /// time is attempted again. Defaults to `1`.
    #[serde(default = "Resources::default_retries")]
    pub retries: u16,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    fn default_unit_timeout() -> u64 {
        3600
    }

    fn default_retries() -> u16 {
        1
    }

    /// Checks if thread count, memory limit and unit timeout
    /// are above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        if self.unit_timeout < 1 {
            return Err(ConfigError::OutOfBounds(
                "Unit timeout cannot be less than 1 s",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
            unit_timeout: Resources::default_unit_timeout(),
            retries: Resources::default_retries(),
        }
    }
}

/// Processing stages a source needs beyond masking, conversion
/// and aggregation which every source goes through.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Capabilities {
    /// More than one file contributes to a month.
    pub sub_monthly_files: bool,

    /// Slices are retained only at `resample.rate` hour steps.
    pub cadence_filter: bool,

    /// Slices are remapped onto the regrid target grid.
    pub regrid: bool,
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub period: Period,

    pub source: Source,

    pub regions: Regions,

    #[serde(default)]
    pub regrid: Regrid,

    #[serde(default)]
    pub resample: Resample,

    /// _(Optional)_ Factor multiplying every value. Defaults to `1`.
    #[serde(default = "Config::default_conversion_factor")]
    pub unit_conversion_factor: Float,

    pub output: Output,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        let config: Config = serde_yaml::from_slice(data.as_slice())?;

        config.check_bounds()?;

        Ok(config)
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        self.period.check_bounds()?;
        self.source.check_bounds()?;
        self.regions.check_bounds()?;
        self.regrid.check_bounds()?;
        self.resample.check_bounds()?;
        self.resources.check_bounds()?;

        if !self.unit_conversion_factor.is_finite() {
            return Err(ConfigError::OutOfBounds(
                "Unit conversion factor must be a finite number",
            ));
        }

        Ok(())
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            sub_monthly_files: self.source.kind == SourceKind::Imerg,
            cadence_filter: self.resample.enabled,
            regrid: self.regrid.enabled,
        }
    }

    /// Path of the mask file for a region, `None` for the global region.
    pub fn mask_path(&self, region: &str) -> Option<PathBuf> {
        if region == GLOBAL_REGION {
            return None;
        }

        Some(
            self.regions
                .masks_dir
                .join(format!("{}{}", region, crate::constants::MASK_FILE_SUFFIX)),
        )
    }

    fn default_conversion_factor() -> Float {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, SourceKind};
    use crate::errors::ConfigError;
    use std::path::PathBuf;

    const IMERG_CONFIG: &str = "
period: { start_year: 2010, end_year: 2011 }
source:
  kind: imerg
  data_dir: ./data/IMERG
  variable: precipitation
regions:
  names: [global, nyc]
  masks_dir: ./masks
regrid: { enabled: true, target: ./regrid_2x2-5.nc }
resample: { enabled: true, rate: 6 }
unit_conversion_factor: 24
output: { dir: ./output }
";

    const GISS_CONFIG: &str = "
period: { start_year: 2012, end_year: 2012 }
source:
  kind: giss
  data_dir: ./data/GISS
  variable: prec
  output_variable: precipitation
regions:
  names: [northeast]
  masks_dir: ./masks
output: { dir: ./output }
";

    #[test]
    fn imerg_config() {
        let config: Config = serde_yaml::from_str(IMERG_CONFIG).unwrap();
        config.check_bounds().unwrap();

        let caps = config.capabilities();
        assert!(caps.sub_monthly_files && caps.cadence_filter && caps.regrid);
        assert_eq!(config.source.extension(), "nc4");
        assert_eq!(config.source.output_variable(), "precipitation");
        assert_eq!(config.resources.threads, 1);
        assert_eq!(config.mask_path("global"), None);
        assert_eq!(
            config.mask_path("nyc"),
            Some(PathBuf::from("./masks/nyc_mask.nc"))
        );
    }

    #[test]
    fn giss_config_defaults() {
        let config: Config = serde_yaml::from_str(GISS_CONFIG).unwrap();
        config.check_bounds().unwrap();

        assert_eq!(config.source.kind, SourceKind::Giss);
        assert_eq!(config.source.extension(), "nc");
        assert_eq!(config.source.output_variable(), "precipitation");
        assert!((config.unit_conversion_factor - 1.0).abs() < f64::EPSILON);

        let caps = config.capabilities();
        assert!(!caps.sub_monthly_files && !caps.cadence_filter && !caps.regrid);
    }

    #[test]
    fn out_of_bounds() {
        let mut config: Config = serde_yaml::from_str(IMERG_CONFIG).unwrap();
        config.resample.rate = 0;
        assert!(matches!(
            config.check_bounds(),
            Err(ConfigError::OutOfBounds(_))
        ));

        let mut config: Config = serde_yaml::from_str(IMERG_CONFIG).unwrap();
        config.regrid.target = None;
        assert!(config.check_bounds().is_err());

        let mut config: Config = serde_yaml::from_str(IMERG_CONFIG).unwrap();
        config.regions.names.push("nyc".to_string());
        assert!(config.check_bounds().is_err());

        let mut config: Config = serde_yaml::from_str(IMERG_CONFIG).unwrap();
        config.period.end_year = 2000;
        assert!(config.check_bounds().is_err());
    }
}
