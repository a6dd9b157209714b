//! Raw-trace classification pass
//!
//! Streams every record of every raw trace file through the migration
//! classifier and splits the records into one completed file per
//! (migration class, working-set size). The record's sequence number is
//! rewritten to the per-class running count so each completed file is
//! self-contained.
//!
//! Raw records are comma-separated with 11 canonical columns
//! (count, wcycle, wss, delay, src, tgt, cold, hot1, hot2, hot3,
//! with-cpmd); trailing address columns and `#` header rows are
//! tolerated and dropped.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::topology::{CacheTopology, MigrationClass};
use crate::trace_key::organize_by_key;

/// Number of canonical columns in a raw trace record
pub const RAW_COLUMNS: usize = 11;

const SRC_COLUMN: usize = 4;
const DST_COLUMN: usize = 5;

/// Outcome of one grouping run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupReport {
    /// Records written, per migration class, across all working-set sizes
    pub records: BTreeMap<MigrationClass, u64>,
    /// Raw files fully processed
    pub files_processed: usize,
    /// Raw files aborted on a malformed record or read failure
    pub files_failed: usize,
}

/// Split raw traces in `traces_dir` into per-(class, wss) completed
/// files under `completed_dir`.
///
/// One completed file is opened per realized migration class and
/// working-set size, named `pmo_host=<host>_type=<class>_wss=<wss>.csv`,
/// so downstream stages see every realized bucket even when it stays
/// empty. A malformed record aborts only its own file; the remaining
/// files still go through, and the failure count lands in the report.
pub fn group_traces(
    traces_dir: &Path,
    completed_dir: &Path,
    topo: &CacheTopology,
    host: &str,
) -> Result<GroupReport> {
    fs::create_dir_all(completed_dir)
        .with_context(|| format!("could not create '{}'", completed_dir.display()))?;

    let classes = topo.migration_classes();
    let by_wss = organize_by_key(traces_dir, "wss")
        .with_context(|| format!("could not list trace directory '{}'", traces_dir.display()))?;

    let mut report = GroupReport::default();

    for (wss, trace_files) in &by_wss {
        let mut outputs: BTreeMap<MigrationClass, BufWriter<File>> = BTreeMap::new();
        let mut counters: BTreeMap<MigrationClass, u64> = BTreeMap::new();

        for &class in &classes {
            let name = format!("pmo_host={host}_type={class}_wss={wss}.csv");
            let path = completed_dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("could not write output file '{}'", path.display()))?;
            outputs.insert(class, BufWriter::new(file));
            counters.insert(class, 0);
        }

        for trace_file in trace_files {
            match split_trace_file(trace_file, topo, &mut outputs, &mut counters) {
                Ok(()) => report.files_processed += 1,
                Err(err) => {
                    warn!("aborting trace file: {err:#}");
                    report.files_failed += 1;
                }
            }
        }

        for writer in outputs.values_mut() {
            writer
                .flush()
                .with_context(|| format!("could not flush completed files for wss={wss}"))?;
        }

        for (class, count) in counters {
            *report.records.entry(class).or_insert(0) += count;
        }

        info!(wss = %wss, files = trace_files.len(), "grouped working-set size");
    }

    Ok(report)
}

/// Stream one raw trace file into the per-class writers.
fn split_trace_file(
    path: &Path,
    topo: &CacheTopology,
    outputs: &mut BTreeMap<MigrationClass, BufWriter<File>>,
    counters: &mut BTreeMap<MigrationClass, u64>,
) -> Result<()> {
    let file = File::open(path)
        .with_context(|| format!("could not read trace file '{}'", path.display()))?;

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line =
            line.with_context(|| format!("could not read trace file '{}'", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() < RAW_COLUMNS {
            bail!(
                "malformed record at {}:{}: {} columns, expected at least {}",
                path.display(),
                lineno + 1,
                fields.len(),
                RAW_COLUMNS
            );
        }

        let src: usize = fields[SRC_COLUMN].parse().with_context(|| {
            format!(
                "malformed source processor at {}:{}",
                path.display(),
                lineno + 1
            )
        })?;
        let dst: usize = fields[DST_COLUMN].parse().with_context(|| {
            format!(
                "malformed destination processor at {}:{}",
                path.display(),
                lineno + 1
            )
        })?;

        let class = topo.migration_class(src, dst)?;

        let count = counters.entry(class).or_insert(0);
        *count += 1;

        let writer = outputs
            .get_mut(&class)
            .with_context(|| format!("no output stream for class {class}"))?;
        writeln!(
            writer,
            "{:>6}, {:>3}, {:>6}, {:>6}, {:>3}, {:>3}, {:>8}, {:>8}, {:>8}, {:>8}, {:>8}",
            count, fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7],
            fields[8], fields[9], fields[10]
        )
        .with_context(|| format!("could not write completed record for class {class}"))?;
    }

    Ok(())
}
