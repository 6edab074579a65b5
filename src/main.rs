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

//! Gridded Precipitation Aggregation System (GPAS) prepares
//! gridded precipitation records from different providers
//! (satellite-derived IMERG half-hourly files and GISS model
//! monthly files) for statistical comparison.
//!
//! Source files are grouped by month, optionally resampled to
//! a fixed cadence and regridded onto a common target grid, masked
//! to named regions, converted to common units and finally folded
//! into two artifacts per (year, month, region): a flattened archive
//! of all values and a time-mean grid. Both artifacts have the same
//! structure regardless of the source, so downstream statistics
//! can treat the providers symmetrically.

mod constants;
mod errors;
mod pipeline;


use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::{alloc, path::Path};

type Float = f64;

/// Global allocator used by the pipeline.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// To provide meaningful diagnostics of skipped units the `env_logger`
/// needs to be initiated before any log messages are possible to occur.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("GPAS_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("GPAS_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    match pipeline::main(Path::new(&config_path)) {
        Ok(summary) => info!(
            "Pipeline finished: {} units written, {} skipped, {} failed. Check the output directory and log.",
            summary.written, summary.skipped, summary.failed
        ),
        Err(err) => {
            error!("Pipeline execution failed with error: {}", err);
            std::process::exit(1);
        }
    }
}
