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

//! Persistence of monthly aggregates and of the run summary.
//!
//! Both artifacts of a unit are first written next to their final
//! location with a `.partial` suffix and renamed into place only after
//! both writes finished. A unit that fails to persist leaves neither
//! artifact behind, and a re-run replaces the previous output as a whole.

use super::{MonthKey, MonthlyAggregate};
use crate::{
    constants::{ARCHIVE_FIELD, MISSING, SUMMARY_FILE},
    errors::{InputError, OutputError},
    Float,
};
use log::debug;
use ndarray::Array1;
use ndarray_npy::{NpzReader, NpzWriter};
use serde::Serialize;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

/// Final locations of both artifacts of a unit.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArtifactPaths {
    pub mean_grid: PathBuf,
    pub archive: PathBuf,
}

impl ArtifactPaths {
    /// `<out>/<year>/<region>/<year>_<MM>_<region>_<variable>[_average]`
    pub fn new(out_dir: &Path, key: &MonthKey, variable: &str) -> Self {
        let dir = out_dir.join(key.year.to_string()).join(&key.region);
        let stem = format!(
            "{}_{:02}_{}_{}",
            key.year, key.month, key.region, variable
        );

        ArtifactPaths {
            mean_grid: dir.join(format!("{}_average.nc", stem)),
            archive: dir.join(format!("{}.npz", stem)),
        }
    }

    fn dir(&self) -> Option<&Path> {
        self.archive.parent()
    }
}

/// Outcome of a single unit as listed in the run summary.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Written,
    Skipped,
    Failed,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct UnitRecord {
    pub year: i32,
    pub month: u32,
    pub region: String,
    pub status: UnitStatus,
    pub slices: usize,
    pub values: usize,
    pub non_missing: usize,
    pub detail: String,
}

/// Writes the mean grid and the flattened archive of `aggregate`.
pub fn persist(aggregate: &MonthlyAggregate, out_dir: &Path) -> Result<ArtifactPaths, OutputError> {
    let paths = ArtifactPaths::new(out_dir, &aggregate.key, &aggregate.variable);

    if let Some(dir) = paths.dir() {
        fs::create_dir_all(dir).map_err(|source| OutputError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let mean_partial = partial_path(&paths.mean_grid);
    let archive_partial = partial_path(&paths.archive);

    // both artifacts are staged before either is moved into place
    let staged = write_mean_grid(&mean_partial, aggregate)
        .and_then(|_| write_archive(&archive_partial, aggregate.flattened()));

    if let Err(err) = staged {
        discard(&[mean_partial.as_path(), archive_partial.as_path()]);
        return Err(err);
    }

    let committed = commit(&mean_partial, &paths.mean_grid)
        .and_then(|_| commit(&archive_partial, &paths.archive));

    if let Err(err) = committed {
        discard(&[
            mean_partial.as_path(),
            archive_partial.as_path(),
            paths.mean_grid.as_path(),
            paths.archive.as_path(),
        ]);
        return Err(err);
    }

    debug!(
        "Persisted {} and {}",
        paths.mean_grid.display(),
        paths.archive.display()
    );

    Ok(paths)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    PathBuf::from(partial)
}

fn commit(partial: &Path, path: &Path) -> Result<(), OutputError> {
    fs::rename(partial, path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Removes files of a unit that failed to persist, some may not exist.
fn discard(paths: &[&Path]) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}

fn write_mean_grid(path: &Path, aggregate: &MonthlyAggregate) -> Result<(), OutputError> {
    let mean: Vec<Float> = aggregate.mean_grid().iter().copied().collect();

    let mut file = netcdf::create(path)?;

    file.add_dimension("lat", aggregate.lat().len())?;
    file.add_dimension("lon", aggregate.lon().len())?;

    {
        let mut var = file.add_variable::<Float>("lat", &["lat"])?;
        var.put_attribute("units", "degrees_north")?;
        var.put_values(&aggregate.lat().to_vec(), ..)?;
    }
    {
        let mut var = file.add_variable::<Float>("lon", &["lon"])?;
        var.put_attribute("units", "degrees_east")?;
        var.put_values(&aggregate.lon().to_vec(), ..)?;
    }
    {
        let mut var = file.add_variable::<Float>(&aggregate.variable, &["lat", "lon"])?;
        var.put_attribute("_FillValue", MISSING)?;
        var.put_values(&mean, ..)?;
    }

    Ok(())
}

fn write_archive(path: &Path, values: &[Float]) -> Result<(), OutputError> {
    let out_file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut npz = NpzWriter::new_compressed(out_file);
    npz.add_array(ARCHIVE_FIELD, &Array1::from(values.to_vec()))?;
    npz.finish()?;

    Ok(())
}

/// Reads the flattened values back from an archive.
pub fn load_archive(path: &Path) -> Result<Array1<Float>, InputError> {
    if !path.is_file() {
        return Err(InputError::FileNotFound(path.to_path_buf()));
    }

    let mut npz = NpzReader::new(File::open(path)?)?;

    let name = npz
        .names()?
        .into_iter()
        .find(|name| name.trim_end_matches(".npy") == ARCHIVE_FIELD)
        .ok_or_else(|| InputError::MissingVariable {
            name: ARCHIVE_FIELD.to_string(),
            path: path.to_path_buf(),
        })?;

    Ok(npz.by_name(&name)?)
}

/// Writes the status of every planned unit into the output directory.
pub fn write_summary(out_dir: &Path, records: &[UnitRecord]) -> Result<PathBuf, OutputError> {
    let path = out_dir.join(SUMMARY_FILE);

    let mut out_file = csv::Writer::from_path(&path)?;

    for record in records {
        out_file.serialize(record)?;
    }

    out_file.flush().map_err(|source| OutputError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}
