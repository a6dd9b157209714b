//! Trace filename mini-language and directory grouping
//!
//! Trace files encode their experiment parameters in the filename:
//! `pmo_host=litmus_wss=1024_wcycle=2_smin=0_smax=1000.csv`. Fields are
//! separated by `_` and split at the first `=`; a field without `=` maps
//! to a valueless key. A fixed set of reserved event-name tokens carry
//! embedded underscores (`SEND_RESCHED`, `RELEASE_LATENCY`, ...) and must
//! not be split — the separator scanner suppresses a split whenever the
//! text after the underscore starts with one of them.
//!
//! This is the only place filenames are treated as structured data. Keep
//! the reserved-token list in sync with the event names the measurement
//! side emits.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Event-name fragments whose leading underscore is not a field
/// separator. Versioned with the trace format.
pub const RESERVED_TOKENS: [&str; 3] = ["RESCHED", "LATENCY", "TIMER"];

/// Width the working-set size is zero-padded to so lexical and numeric
/// order coincide.
pub const WSS_PAD_WIDTH: usize = 5;

/// Errors raised by filename decoding and key lookup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TraceKeyError {
    #[error("filename '{name}' does not encode required key '{key}'")]
    MissingKey { name: String, key: String },
}

/// Result type for trace-key operations
pub type Result<T> = std::result::Result<T, TraceKeyError>;

/// Decoded key/value parameters of one trace filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceKey {
    name: String,
    params: HashMap<String, Option<String>>,
}

impl TraceKey {
    /// Look up a key, `None` meaning "present without a value".
    pub fn get(&self, key: &str) -> Option<&Option<String>> {
        self.params.get(key)
    }

    /// Look up a key that must be present with a value.
    ///
    /// Absent keys (or valueless ones) are an error naming the source
    /// filename; callers must not substitute defaults.
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.params.get(key) {
            Some(Some(value)) => Ok(value),
            _ => Err(TraceKeyError::MissingKey {
                name: self.name.clone(),
                key: key.to_string(),
            }),
        }
    }

    /// Number of decoded fields
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when no fields were decoded
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Split a filename stem at underscores, except where the remainder
/// starts with a reserved token.
fn split_fields(stem: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;

    for (idx, byte) in stem.bytes().enumerate() {
        if byte != b'_' {
            continue;
        }
        let rest = &stem[idx + 1..];
        if RESERVED_TOKENS.iter().any(|t| rest.starts_with(t)) {
            continue;
        }
        fields.push(&stem[start..idx]);
        start = idx + 1;
    }
    fields.push(&stem[start..]);
    fields
}

/// Decode a filename stem into its key/value parameters.
///
/// `decode("res_plugin=GSN-EDF_wss=1024_tss=8")` yields
/// `res -> None, plugin -> "GSN-EDF", wss -> "1024", tss -> "8"`.
pub fn decode(stem: &str) -> TraceKey {
    let mut params = HashMap::new();

    for field in split_fields(stem) {
        match field.split_once('=') {
            Some((key, value)) => params.insert(key.to_string(), Some(value.to_string())),
            None => params.insert(field.to_string(), None),
        };
    }

    TraceKey {
        name: stem.to_string(),
        params,
    }
}

/// Filename stem: basename with the final extension removed.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Zero-pad a working-set size value to [`WSS_PAD_WIDTH`] digits.
pub fn pad_wss(wss: &str) -> String {
    format!("{:0>width$}", wss, width = WSS_PAD_WIDTH)
}

/// Bucket every file in a directory by the value of one filename key.
///
/// Discovery order is preserved within a bucket; bucket iteration order
/// is deterministic (sorted by value). Files whose name does not encode
/// the key are skipped with a warning, per the missing-key policy.
pub fn organize_by_key(dir: &Path, key: &str) -> std::io::Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut buckets: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match decode(&stem(&path)).require(key) {
            Ok(value) => buckets.entry(value.to_string()).or_default().push(path),
            Err(err) => warn!("skipping '{}': {}", path.display(), err),
        }
    }

    Ok(buckets)
}

/// Bucket completed trace files by migration type, then by zero-padded
/// working-set size. The inner map iterates in ascending numeric wss
/// order thanks to the padding.
pub fn organize_completed(
    dir: &Path,
) -> std::io::Result<BTreeMap<String, BTreeMap<String, PathBuf>>> {
    let mut buckets: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let params = decode(&stem(&path));
        let (migtype, wss) = match (params.require("type"), params.require("wss")) {
            (Ok(t), Ok(w)) => (t.to_string(), pad_wss(w)),
            (Err(err), _) | (_, Err(err)) => {
                warn!("skipping '{}': {}", path.display(), err);
                continue;
            }
        };
        buckets.entry(migtype).or_default().insert(wss, path);
    }

    Ok(buckets)
}
