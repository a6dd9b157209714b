//! Sysfs CPU range-list parsing
//!
//! The kernel describes cache sharing sets as compact range lists such as
//! `"1,2-4,8"` (`shared_cpu_list` attributes). This module turns such a
//! list into an explicit set of processor ids.

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors produced while parsing a CPU range list
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CpuListError {
    #[error("empty CPU list")]
    Empty,

    #[error("malformed CPU list token '{0}'")]
    MalformedToken(String),

    #[error("inverted range '{0}' (upper bound below lower bound)")]
    InvertedRange(String),
}

/// Result type for CPU list operations
pub type Result<T> = std::result::Result<T, CpuListError>;

/// Parse a range list into the set of processor ids it denotes.
///
/// Accepts comma-separated tokens, each either a single non-negative
/// integer or an inclusive `lo-hi` range. Whitespace around tokens is
/// ignored.
///
/// # Example
/// ```
/// use cpmd::cpulist;
///
/// let cpus = cpulist::parse("1, 2-4,8").unwrap();
/// assert_eq!(cpus.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 8]);
/// ```
pub fn parse(rangelist: &str) -> Result<BTreeSet<usize>> {
    if rangelist.trim().is_empty() {
        return Err(CpuListError::Empty);
    }

    let mut cpus = BTreeSet::new();

    for token in rangelist.split(',') {
        let token = token.trim();

        if let Some((lo, hi)) = token.split_once('-') {
            let lo: usize = lo
                .trim()
                .parse()
                .map_err(|_| CpuListError::MalformedToken(token.to_string()))?;
            let hi: usize = hi
                .trim()
                .parse()
                .map_err(|_| CpuListError::MalformedToken(token.to_string()))?;
            if hi < lo {
                return Err(CpuListError::InvertedRange(token.to_string()));
            }
            cpus.extend(lo..=hi);
        } else {
            let cpu: usize = token
                .parse()
                .map_err(|_| CpuListError::MalformedToken(token.to_string()))?;
            cpus.insert(cpu);
        }
    }

    Ok(cpus)
}

/// Test whether a processor id appears in a range list.
pub fn contains(rangelist: &str, cpu: usize) -> Result<bool> {
    Ok(parse(rangelist)?.contains(&cpu))
}
