//! Overhead model builder
//!
//! Consumes the per-(class, wss) completed files, derives one CPMD value
//! per record, removes outliers through the extended IQR fence and
//! aggregates what survives into one summary record per bucket. Records
//! land in one `model_type=<class>` file per migration class, buckets in
//! ascending working-set-size order.
//!
//! A record's CPMD is `after_resume - min(cold, hot1, hot2, hot3)`: the
//! post-migration run compared against the best warm-cache run of the
//! same working set.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::iqr;
use crate::stats::Summary;
use crate::topology::MigrationClass;
use crate::trace_key::organize_completed;

/// First of the five overhead columns in a completed record
const COLD_COLUMN: usize = 6;

/// Model builder knobs
#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
    /// Clock frequency in MHz; statistics are emitted in milliseconds.
    /// Zero disables conversion and keeps raw cycles.
    pub clock_mhz: f64,
    /// IQR fence extension factor
    pub extent: f64,
    /// Use at most this many records per bucket (file order), for
    /// statistical comparability across buckets
    pub sample_cap: Option<usize>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            clock_mhz: 0.0,
            extent: iqr::DEFAULT_EXTENT,
            sample_cap: None,
        }
    }
}

impl ModelOptions {
    /// Cycles per output unit: cycles per millisecond at the configured
    /// clock, or 1 when conversion is disabled.
    pub fn cycles_per_unit(&self) -> f64 {
        if self.clock_mhz == 0.0 {
            1.0
        } else {
            self.clock_mhz * 1000.0
        }
    }
}

/// One line of the overhead model: the aggregated statistics of a single
/// (migration class, working-set size) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct OverheadModelRecord {
    pub migration: MigrationClass,
    pub wss: u64,
    /// Records fed to the filter (after the optional cap)
    pub samples: usize,
    /// Records surviving the filter
    pub filtered_samples: usize,
    pub max: f64,
    pub mean: f64,
    pub min: f64,
    pub median: f64,
    pub stddev: f64,
    pub variance: f64,
    pub max_cutoff: f64,
    pub min_cutoff: f64,
}

impl OverheadModelRecord {
    /// Divide the eight floating-point statistics by a unit factor;
    /// counts are unit-less and stay put.
    fn scaled(mut self, cycles_per_unit: f64) -> Self {
        self.max /= cycles_per_unit;
        self.mean /= cycles_per_unit;
        self.min /= cycles_per_unit;
        self.median /= cycles_per_unit;
        self.stddev /= cycles_per_unit;
        self.variance /= cycles_per_unit;
        self.max_cutoff /= cycles_per_unit;
        self.min_cutoff /= cycles_per_unit;
        self
    }

    /// Tab-separated model line: label, wss, two counts, then the eight
    /// statistics in fixed high-precision scientific notation.
    pub fn tsv_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}\t{:.12e}",
            self.migration,
            self.wss,
            self.samples,
            self.filtered_samples,
            self.max,
            self.mean,
            self.min,
            self.median,
            self.stddev,
            self.variance,
            self.max_cutoff,
            self.min_cutoff,
        )
    }
}

/// Build the overhead model from a directory of completed files.
///
/// Writes one `model_type=<class>` file per migration class under
/// `model_dir` and returns every record written, grouped per class in
/// ascending working-set-size order. Buckets with no records are
/// skipped with a warning.
pub fn build_model(
    completed_dir: &Path,
    model_dir: &Path,
    opts: &ModelOptions,
) -> Result<Vec<OverheadModelRecord>> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("could not create '{}'", model_dir.display()))?;

    let buckets = organize_completed(completed_dir).with_context(|| {
        format!(
            "could not list completed directory '{}'",
            completed_dir.display()
        )
    })?;

    let cycles_per_unit = opts.cycles_per_unit();
    let mut records = Vec::new();

    for (label, by_wss) in &buckets {
        let migration: MigrationClass = label
            .parse()
            .with_context(|| format!("unrecognized migration class '{label}' in completed file name"))?;

        let path = model_dir.join(format!("model_type={label}"));
        let file = File::create(&path)
            .with_context(|| format!("could not write model file '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);

        // padded keys iterate in ascending numeric order
        for (padded_wss, completed_file) in by_wss {
            let wss: u64 = padded_wss
                .trim_start_matches('0')
                .parse()
                .or_else(|_| padded_wss.parse())
                .with_context(|| format!("non-numeric wss in '{}'", completed_file.display()))?;

            let mut seq = read_cpmd_samples(completed_file, opts.sample_cap)?;
            if seq.is_empty() {
                warn!(
                    "skipping empty bucket '{}' (no records survived acquisition)",
                    completed_file.display()
                );
                continue;
            }

            seq.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let samples = seq.len();
            let outcome = iqr::apply(&seq, opts.extent);
            let summary = Summary::of_sorted(&outcome.values)
                .with_context(|| format!("bucket '{}' emptied by filter", completed_file.display()))?;

            let record = OverheadModelRecord {
                migration,
                wss,
                samples,
                filtered_samples: outcome.values.len(),
                max: summary.max,
                mean: summary.mean,
                min: summary.min,
                median: summary.median,
                stddev: summary.stddev,
                variance: summary.variance,
                max_cutoff: outcome.max_cutoff,
                min_cutoff: outcome.min_cutoff,
            }
            .scaled(cycles_per_unit);

            writeln!(writer, "{}", record.tsv_line())
                .with_context(|| format!("could not write model file '{}'", path.display()))?;
            records.push(record);
        }

        writer
            .flush()
            .with_context(|| format!("could not write model file '{}'", path.display()))?;
        info!(class = %migration, "wrote model file");
    }

    Ok(records)
}

/// Read one completed file and derive the CPMD value of every record.
fn read_cpmd_samples(path: &Path, cap: Option<usize>) -> Result<Vec<f64>> {
    let file = File::open(path)
        .with_context(|| format!("could not read completed file '{}'", path.display()))?;

    let mut seq = Vec::new();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        if let Some(cap) = cap {
            if seq.len() >= cap {
                break;
            }
        }

        let line = line
            .with_context(|| format!("could not read completed file '{}'", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() < COLD_COLUMN + 5 {
            bail!(
                "malformed record at {}:{}: {} columns, expected at least {}",
                path.display(),
                lineno + 1,
                fields.len(),
                COLD_COLUMN + 5
            );
        }

        let mut overheads = [0i64; 5];
        for (i, slot) in overheads.iter_mut().enumerate() {
            *slot = fields[COLD_COLUMN + i].parse().with_context(|| {
                format!(
                    "malformed overhead column {} at {}:{}",
                    COLD_COLUMN + i,
                    path.display(),
                    lineno + 1
                )
            })?;
        }

        let [cold, hot1, hot2, hot3, after_resume] = overheads;
        let min_hot = cold.min(hot1).min(hot2).min(hot3);
        seq.push((after_resume - min_hot) as f64);
    }

    Ok(seq)
}
