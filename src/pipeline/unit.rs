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

//! Processing of a single (year, month, region) unit.
//!
//! Every source file of the unit is read, filtered by cadence,
//! regridded, masked and converted before it is folded into the
//! monthly aggregate, which is persisted once all files are done.
//! Units share only read-only state, so any number of them can run
//! on the thread pool at once.

use super::{
    aggregate::{
        writer::{self, ArtifactPaths},
        MonthKey, MonthlyAggregate,
    },
    cadence,
    configuration::{Capabilities, Config},
    conversion,
    grid::{reader, regrid, GridFile, TargetGrid},
    mask::{self, AlignedMask, RegionMask},
};
use crate::errors::UnitError;
use log::{debug, warn};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Read-only state of a run shared by all units.
#[derive(Debug)]
pub struct RunContext {
    pub config: Config,
    pub capabilities: Capabilities,
    pub target: Option<TargetGrid>,
    cancelled: AtomicBool,
}

impl RunContext {
    pub fn new(config: Config, target: Option<TargetGrid>) -> Self {
        RunContext {
            capabilities: config.capabilities(),
            config,
            target,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Asks all units still running or waiting to stop without writing.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cadence_rate(&self) -> Option<u32> {
        if self.capabilities.cadence_filter {
            Some(self.config.resample.rate)
        } else {
            None
        }
    }
}

/// One unit of work with its files in grouping order.
#[derive(Clone, Debug)]
pub struct MonthUnit {
    pub key: MonthKey,
    pub files: Vec<PathBuf>,
    pub mask: Arc<RegionMask>,
}

/// Counts describing a persisted unit.
#[derive(Clone, PartialEq, Debug)]
pub struct UnitReport {
    pub slices: usize,
    pub values: usize,
    pub non_missing: usize,
    pub paths: ArtifactPaths,
}

/// Processes a unit, attempting it again when it runs out of time.
pub fn deploy(unit: &MonthUnit, context: &Arc<RunContext>) -> Result<UnitReport, UnitError> {
    let timeout = Duration::from_secs(context.config.resources.unit_timeout);
    let retries = context.config.resources.retries;

    let mut attempt = 0;

    loop {
        let deadline = Instant::now().checked_add(timeout);

        match process(unit, context, deadline) {
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                warn!(
                    "Unit {} failed: {}, retrying (attempt {} of {})",
                    unit.key,
                    err,
                    attempt,
                    retries
                );
            }
            result => return result,
        }
    }
}

/// Runs all stages of a unit once.
///
/// Cancellation and the deadline are checked before every file
/// and before writing, so an abandoned unit never leaves artifacts.
pub(super) fn process(
    unit: &MonthUnit,
    context: &RunContext,
    deadline: Option<Instant>,
) -> Result<UnitReport, UnitError> {
    let config = &context.config;

    let checkpoint = || -> Result<(), UnitError> {
        if context.is_cancelled() {
            return Err(UnitError::Cancelled);
        }

        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            return Err(UnitError::TimedOut(config.resources.unit_timeout));
        }

        Ok(())
    };

    let mut aggregate = MonthlyAggregate::new(unit.key.clone(), config.source.output_variable());
    let mut aligned: Option<((usize, usize), AlignedMask)> = None;

    for path in &unit.files {
        checkpoint()?;

        let grid_file = match reader::read_grid_file(
            path,
            &config.source.variable,
            context.capabilities.cadence_filter,
        ) {
            Ok(grid_file) => grid_file,
            Err(err) if err.is_missing_resource() => {
                warn!("Unit {}: source file is missing: {}", unit.key, err);
                continue;
            }
            Err(err) => {
                warn!("Unit {}: skipping malformed {}: {}", unit.key, path.display(), err);
                continue;
            }
        };

        if !passes_cadence(&grid_file, context.cadence_rate()) {
            debug!("Unit {}: {} is off cadence", unit.key, path.display());
            continue;
        }

        let grid_file = match &context.target {
            Some(target) => regrid::remap(grid_file, target),
            None => grid_file,
        };

        // masks are aligned once per grid shape
        let shape = grid_file.grid_shape();
        let region_mask = match aligned.take() {
            Some((aligned_shape, region_mask)) if aligned_shape == shape => region_mask,
            _ => {
                debug!(
                    "Unit {}: aligning mask of '{}' to a {:?} grid",
                    unit.key,
                    unit.mask.region(),
                    shape
                );
                unit.mask.align_to(&grid_file.lat, &grid_file.lon)?
            }
        };

        let grid_file = mask::apply(grid_file, &region_mask, unit.mask.region())?;
        aligned = Some((shape, region_mask));

        let grid_file = conversion::convert(grid_file, config.unit_conversion_factor);

        aggregate.fold(grid_file)?;
    }

    checkpoint()?;

    if aggregate.is_empty() {
        return Err(UnitError::EmptyAggregate);
    }

    let paths = match writer::persist(&aggregate, &config.output.dir) {
        Ok(paths) => paths,
        Err(err) => {
            context.cancel();
            return Err(err.into());
        }
    };

    Ok(UnitReport {
        slices: aggregate.slices(),
        values: aggregate.flattened().len(),
        non_missing: aggregate.non_missing(),
        paths,
    })
}

/// Applies the cadence filter to a whole file.
///
/// Only the first timestamp is inspected, files holding more
/// than one are reported.
fn passes_cadence(grid_file: &GridFile, rate: Option<u32>) -> bool {
    if rate.is_none() {
        return true;
    }

    let first = match grid_file.first_time() {
        Some(first) => first,
        None => return false,
    };

    if grid_file.times.len() > 1 {
        warn!(
            "{} holds {} timestamps, only the first ({:02}:{:02}) decides its cadence",
            grid_file.path.display(),
            grid_file.times.len(),
            first.hour,
            first.minute
        );
    }

    cadence::retain(rate, first)
}

#[cfg(test)]
mod tests {
    use super::{process, MonthUnit, RunContext};
    use crate::errors::UnitError;
    use crate::pipeline::aggregate::MonthKey;
    use crate::pipeline::mask::RegionMask;
    use crate::super_tests::fixtures::{imerg_config, GridFixture};
    use std::{sync::Arc, time::Instant};

    fn unit(files: Vec<std::path::PathBuf>) -> MonthUnit {
        MonthUnit {
            key: MonthKey {
                year: 2010,
                month: 1,
                region: "global".to_string(),
            },
            files,
            mask: Arc::new(RegionMask::Global),
        }
    }

    #[test]
    fn first_timestamp_decides() {
        let dir = tempfile::tempdir().unwrap();
        let config = imerg_config(dir.path(), 6, false);

        // both files hold two slices, only the first stamp is checked
        let on_cadence = GridFixture::new(&[0.0, 3.0]).write(&dir.path().join("a.nc4"));
        let off_cadence = GridFixture::new(&[3.0, 6.0]).write(&dir.path().join("b.nc4"));

        let context = RunContext::new(config, None);
        let report = process(&unit(vec![on_cadence, off_cadence]), &context, None).unwrap();

        assert_eq!(report.slices, 2);
        assert_eq!(report.values, 2 * GridFixture::CELLS);
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = imerg_config(dir.path(), 6, false);

        let good = GridFixture::new(&[12.0]).write(&dir.path().join("good.nc4"));
        let missing = dir.path().join("missing.nc4");

        let context = RunContext::new(config, None);
        let report = process(&unit(vec![missing, good]), &context, None).unwrap();

        assert_eq!(report.slices, 1);
    }

    #[test]
    fn nothing_retained() {
        let dir = tempfile::tempdir().unwrap();
        let config = imerg_config(dir.path(), 6, false);

        let off_cadence = GridFixture::new(&[1.0]).write(&dir.path().join("a.nc4"));

        let context = RunContext::new(config, None);
        let result = process(&unit(vec![off_cadence]), &context, None);

        assert!(matches!(result, Err(UnitError::EmptyAggregate)));
    }

    #[test]
    fn expired_deadline_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let config = imerg_config(dir.path(), 6, false);

        let file = GridFixture::new(&[0.0]).write(&dir.path().join("a.nc4"));

        let context = RunContext::new(config, None);
        let err = process(&unit(vec![file]), &context, Some(Instant::now())).unwrap_err();

        assert!(matches!(err, UnitError::TimedOut(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn cancelled_unit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = imerg_config(dir.path(), 6, false);
        let out_dir = config.output.dir.clone();

        let file = GridFixture::new(&[0.0]).write(&dir.path().join("a.nc4"));

        let context = RunContext::new(config, None);
        context.cancel();
        let err = process(&unit(vec![file]), &context, None).unwrap_err();

        assert!(matches!(err, UnitError::Cancelled));
        assert!(!err.is_retryable());
        assert!(!out_dir.join("2010").exists());
    }
}
