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

//! Module containing the actual pipeline code.
//!
//! The pipeline runs once per (year, month, region) unit:
//! source files of the month are found by [`grouping`], filtered
//! by [`cadence`], remapped by [`grid::regrid`], masked by [`mask`],
//! converted by [`conversion`] and folded by [`aggregate`] into the
//! flattened archive and the mean grid. Units are independent of each
//! other and are deployed onto a thread pool; a unit that fails is
//! reported and never stops the remaining ones.

pub mod aggregate;
pub mod cadence;
pub mod configuration;
pub mod conversion;
pub mod grid;
pub mod grouping;
pub mod mask;
pub mod unit;

use self::{
    aggregate::{
        writer::{self, UnitRecord, UnitStatus},
        MonthKey,
    },
    configuration::Config,
    grid::{reader, TargetGrid},
    grouping::{KeyExtractor, MonthFiles},
    mask::RegionMask,
    unit::{MonthUnit, RunContext, UnitReport},
};
use crate::{
    errors::{ConfigError, PipelineError, UnitError},
    ALLOCATOR,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    fs,
    path::Path,
    sync::{mpsc, Arc},
};

/// Counts of unit outcomes in a finished run.
#[derive(Clone, PartialEq, Debug)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records: Vec<UnitRecord>,
}

/// Main pipeline function, reads the configuration
/// and runs all units it describes.
pub fn main(config_path: &Path) -> Result<RunSummary, PipelineError> {
    debug!("Reading configuration from {}", config_path.display());
    let config = Config::new_from_file(config_path)?;

    run(config)
}

/// Runs the pipeline for an already loaded configuration.
///
/// Returns an error only when the whole run is meaningless,
/// failures of single units end up in the summary.
pub fn run(config: Config) -> Result<RunSummary, PipelineError> {
    info!("Preparing the pipeline core");

    let core = Core::new(config)?;
    let (units, mut records) = plan_units(&core);
    let units_count = units.len();

    info!(
        "Deploying {} units ({} skipped at planning)",
        units_count,
        records.len()
    );

    // set progress bar for processed units
    let units_bar = ProgressBar::new(units_count as u64);
    units_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    units_bar.set_prefix("Processed units");

    // deploy units on to the threadpool
    let (tx, rx) = mpsc::channel();

    for unit in units {
        let tx = tx.clone();
        let context = Arc::clone(&core.context);

        core.threadpool.spawn(move || {
            let result = unit::deploy(&unit, &context);

            if let Err(err) = tx.send((unit.key, result)) {
                error!("Unit result could not be reported: {}", err);
            }
        });
    }

    // the loop below ends when every task dropped its sender
    drop(tx);

    for (key, result) in rx {
        records.push(unit_record(key, result));
        units_bar.inc(1);
    }

    units_bar.finish_with_message("All units finished");

    if core.context.is_cancelled() {
        error!(
            "Processing was cancelled after an output write failed, check {}",
            core.context.config.output.dir.display()
        );
    }

    records.sort_by(|a, b| (a.year, &a.region, a.month).cmp(&(b.year, &b.region, b.month)));

    let summary_path = writer::write_summary(&core.context.config.output.dir, &records)?;
    info!("Run summary written to {}", summary_path.display());

    let count = |status: UnitStatus| records.iter().filter(|r| r.status == status).count();

    Ok(RunSummary {
        written: count(UnitStatus::Written),
        skipped: count(UnitStatus::Skipped),
        failed: count(UnitStatus::Failed),
        records,
    })
}

/// Structure containing everything loaded
/// before units can be deployed.
#[derive(Debug)]
pub struct Core {
    pub threadpool: ThreadPool,
    pub context: Arc<RunContext>,
    pub masks: Vec<(String, Result<Arc<RegionMask>, String>)>,
}

impl Core {
    /// Pipeline [`Core`] constructor.
    ///
    /// The target grid is loaded once and shared; without it a run with
    /// regridding cannot produce comparable output. Masks are loaded once
    /// per region and a region whose mask is unusable is only reported.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        debug!("Setting memory limit");
        ALLOCATOR
            .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
            .map_err(|_| PipelineError::MemoryLimit(config.resources.memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        let target = load_target_grid(&config)?;

        debug!("Checking and setting output directory");
        fs::create_dir_all(&config.output.dir)?;

        let masks = config
            .regions
            .names
            .iter()
            .map(|region| {
                let mask = RegionMask::load(region, config.mask_path(region).as_deref())
                    .map(Arc::new)
                    .map_err(|err| {
                        error!("Region '{}' will be skipped: {}", region, err);
                        err.to_string()
                    });

                (region.clone(), mask)
            })
            .collect();

        Ok(Core {
            threadpool,
            context: Arc::new(RunContext::new(config, target)),
            masks,
        })
    }
}

fn load_target_grid(config: &Config) -> Result<Option<TargetGrid>, PipelineError> {
    if !config.capabilities().regrid {
        return Ok(None);
    }

    match &config.regrid.target {
        Some(path) => {
            debug!("Reading regrid target from {}", path.display());
            let target = reader::read_target_grid(path).map_err(PipelineError::TargetGrid)?;

            Ok(Some(target))
        }
        None => Err(PipelineError::Config(
            ConfigError::OutOfBounds("Regrid target is required when regridding"),
        )),
    }
}

/// Lists units of all requested years, regions and months.
///
/// Units that cannot run (no source files, unusable mask) are
/// returned as already finished records.
fn plan_units(core: &Core) -> (Vec<MonthUnit>, Vec<UnitRecord>) {
    let config = &core.context.config;
    let capabilities = core.context.capabilities;

    let mut units = vec![];
    let mut records = vec![];

    let extractor = match KeyExtractor::new(config.source.kind) {
        Ok(extractor) => Some(extractor),
        Err(err) => {
            error!("Source file names cannot be matched: {}", err);
            None
        }
    };

    for year in config.period.years() {
        let year_dir = config.source.data_dir.join(year.to_string());

        let month_files = match &extractor {
            Some(extractor) => grouping::group_year(
                &year_dir,
                year,
                config.source.extension(),
                extractor,
                capabilities.sub_monthly_files,
            )
            .unwrap_or_else(|err| {
                warn!("No source files for {}: {}", year, err);
                MonthFiles::new()
            }),
            None => MonthFiles::new(),
        };

        for (region, mask) in &core.masks {
            for month in 1..=12 {
                let key = MonthKey {
                    year,
                    month,
                    region: region.clone(),
                };

                let mask = match mask {
                    Ok(mask) => mask,
                    Err(detail) => {
                        records.push(planned_record(&key, UnitStatus::Failed, detail));
                        continue;
                    }
                };

                match month_files.get(&month) {
                    Some(files) if !files.is_empty() => units.push(MonthUnit {
                        key,
                        files: files.clone(),
                        mask: Arc::clone(mask),
                    }),
                    _ => {
                        warn!("Unit {}: no source files, nothing will be written", key);
                        records.push(planned_record(
                            &key,
                            UnitStatus::Skipped,
                            "No source files for this month",
                        ));
                    }
                }
            }
        }
    }

    (units, records)
}

fn planned_record(key: &MonthKey, status: UnitStatus, detail: &str) -> UnitRecord {
    UnitRecord {
        year: key.year,
        month: key.month,
        region: key.region.clone(),
        status,
        slices: 0,
        values: 0,
        non_missing: 0,
        detail: detail.to_string(),
    }
}

fn unit_record(key: MonthKey, result: Result<UnitReport, UnitError>) -> UnitRecord {
    match result {
        Ok(report) => {
            debug!("Unit {} written to {}", key, report.paths.archive.display());

            UnitRecord {
                year: key.year,
                month: key.month,
                region: key.region,
                status: UnitStatus::Written,
                slices: report.slices,
                values: report.values,
                non_missing: report.non_missing,
                detail: String::new(),
            }
        }
        Err(UnitError::EmptyAggregate) => {
            warn!("Unit {}: {}, nothing will be written", key, UnitError::EmptyAggregate);
            planned_record(&key, UnitStatus::Skipped, &UnitError::EmptyAggregate.to_string())
        }
        Err(err) => {
            error!("Unit {} failed: {}", key, err);
            planned_record(&key, UnitStatus::Failed, &err.to_string())
        }
    }
}
