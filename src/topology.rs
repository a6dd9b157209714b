//! Cache topology model and migration classifier
//!
//! Discovers (or reloads) the machine's cache hierarchy and answers, for
//! any ordered pair of processors, which memory level a migration between
//! them crosses: PREEMPTION for the same processor, `L<k>` for the
//! closest shared cache level, MEMORY when the pair shares no cache.
//!
//! The model is built once per run and is immutable afterwards; a
//! topology change means rebuilding the whole model, not patching it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cpulist::{self, CpuListError};

/// Default sysfs root holding per-CPU cache directories
pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Errors raised while building or querying the topology model.
///
/// Construction is all-or-nothing: any failure here means no valid
/// classification can proceed.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("could not read cache attribute '{path}': {source}")]
    AttributeRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not enumerate cache entries for cpu{cpu}: {source}")]
    CacheEnumeration { cpu: usize, source: std::io::Error },

    #[error("malformed cache attribute '{path}': {detail}")]
    AttributeParse { path: PathBuf, detail: String },

    #[error("malformed shared_cpu_list for cpu{cpu} level {level}: {source}")]
    SharedCpus {
        cpu: usize,
        level: u32,
        source: CpuListError,
    },

    #[error("could not write topology snapshot '{path}': {source}")]
    SnapshotWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not read topology snapshot '{path}': {source}")]
    SnapshotRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid topology snapshot '{path}': {source}")]
    SnapshotDecode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("processor pair ({source_cpu},{dest_cpu}) out of range for {cpus}-processor topology")]
    ProcessorOutOfRange {
        source_cpu: usize,
        dest_cpu: usize,
        cpus: usize,
    },
}

/// Result type for topology operations
pub type Result<T> = std::result::Result<T, TopologyError>;

/// Cache kind as reported by sysfs `type` attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheKind {
    Data,
    Instruction,
    Unified,
    Unknown,
}

impl CacheKind {
    fn from_sysfs(raw: &str) -> Self {
        match raw.trim() {
            "Data" => Self::Data,
            "Instruction" => Self::Instruction,
            "Unified" => Self::Unified,
            _ => Self::Unknown,
        }
    }

    /// Instruction and Unknown caches never gate a migration
    fn gates_migration(self) -> bool {
        matches!(self, Self::Data | Self::Unified)
    }
}

/// One cache a processor belongs to. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDescriptor {
    /// Processor this descriptor was discovered on
    pub cpu: usize,
    /// Cache level (1 = closest to the core)
    pub level: u32,
    pub kind: CacheKind,
    /// Processors sharing this cache, including `cpu` itself
    pub shared_cpus: BTreeSet<usize>,
}

/// Classification of a preemption/migration event by the memory level it
/// crosses. Ordered closest-first: PREEMPTION < L1 < L2 < ... < MEMORY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MigrationClass {
    /// Same-processor preemption, no migration at all
    Preemption,
    /// Migration through a shared cache at this level
    Cache(u32),
    /// No shared cache: the pair communicates through main memory
    Memory,
}

impl fmt::Display for MigrationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preemption => write!(f, "PREEMPTION"),
            Self::Cache(level) => write!(f, "L{level}"),
            Self::Memory => write!(f, "MEMORY"),
        }
    }
}

/// Error for unrecognized migration class labels
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unrecognized migration class label '{0}'")]
pub struct ParseMigrationClassError(String);

impl FromStr for MigrationClass {
    type Err = ParseMigrationClassError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PREEMPTION" => Ok(Self::Preemption),
            "MEMORY" => Ok(Self::Memory),
            _ => s
                .strip_prefix('L')
                .and_then(|lvl| lvl.parse::<u32>().ok())
                .map(Self::Cache)
                .ok_or_else(|| ParseMigrationClassError(s.to_string())),
        }
    }
}

/// Per-source partition of the processor set by migration class
pub type MigrationTable = Vec<BTreeMap<MigrationClass, BTreeSet<usize>>>;

/// The machine's cache hierarchy plus the derived migration table
#[derive(Debug, Clone)]
pub struct CacheTopology {
    /// Per-processor cache descriptors, sorted by ascending level with
    /// discovery order as the tie-break
    caches: Vec<Vec<CacheDescriptor>>,
    table: MigrationTable,
}

impl CacheTopology {
    /// Discover the topology of the running machine from sysfs.
    pub fn discover() -> Result<Self> {
        Self::discover_from(Path::new(SYSFS_CPU_ROOT), num_cpus::get())
    }

    /// Discover a topology from a sysfs-shaped directory tree.
    ///
    /// Expects `<root>/cpu<N>/cache/index<M>/{level,type,shared_cpu_list}`
    /// for each of `cpus` processors. Injectable root keeps discovery
    /// testable against fabricated trees.
    pub fn discover_from(root: &Path, cpus: usize) -> Result<Self> {
        let mut caches = Vec::with_capacity(cpus);

        for cpu in 0..cpus {
            let cache_dir = root.join(format!("cpu{cpu}")).join("cache");
            let mut indices: Vec<PathBuf> = fs::read_dir(&cache_dir)
                .map_err(|source| TopologyError::CacheEnumeration { cpu, source })?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("index"))
                })
                .collect();
            // index10 must not sort before index2
            indices.sort_by_key(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("index"))
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(u32::MAX)
            });

            let mut descriptors = Vec::with_capacity(indices.len());
            for index_dir in indices {
                descriptors.push(Self::read_descriptor(cpu, &index_dir)?);
            }
            caches.push(descriptors);
        }

        Ok(Self::from_descriptors(caches))
    }

    /// Reload a topology previously written by [`save_snapshot`].
    ///
    /// The processor count is inferred from the snapshot length.
    ///
    /// [`save_snapshot`]: CacheTopology::save_snapshot
    pub fn load_snapshot(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| TopologyError::SnapshotRead {
            path: path.to_path_buf(),
            source,
        })?;
        let caches: Vec<Vec<CacheDescriptor>> = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| TopologyError::SnapshotDecode {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_descriptors(caches))
    }

    /// Persist the cache descriptors for later [`load_snapshot`] runs.
    ///
    /// The handle is scoped to this function and closed on every exit
    /// path.
    ///
    /// [`load_snapshot`]: CacheTopology::load_snapshot
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| TopologyError::SnapshotWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.caches).map_err(|source| {
            TopologyError::SnapshotWrite {
                path: path.to_path_buf(),
                source: source.into(),
            }
        })
    }

    /// Number of processors in the model
    pub fn processor_count(&self) -> usize {
        self.caches.len()
    }

    /// Classify the migration from `source_cpu` to `dest_cpu`.
    ///
    /// Attribution goes to the closest shared cache level: that is the
    /// level whose eviction and refill actually bounds the resume delay.
    pub fn migration_class(&self, source_cpu: usize, dest_cpu: usize) -> Result<MigrationClass> {
        let cpus = self.processor_count();
        if source_cpu >= cpus || dest_cpu >= cpus {
            return Err(TopologyError::ProcessorOutOfRange {
                source_cpu,
                dest_cpu,
                cpus,
            });
        }

        if source_cpu == dest_cpu {
            return Ok(MigrationClass::Preemption);
        }

        for descriptor in &self.caches[source_cpu] {
            if !descriptor.kind.gates_migration() {
                continue;
            }
            if descriptor.shared_cpus.contains(&dest_cpu) {
                return Ok(MigrationClass::Cache(descriptor.level));
            }
        }

        Ok(MigrationClass::Memory)
    }

    /// The full source -> class -> destinations table.
    pub fn migration_table(&self) -> &MigrationTable {
        &self.table
    }

    /// Migration classes realized anywhere on this topology.
    ///
    /// Downstream stages materialize one output stream per realized
    /// class, so classes no processor pair can produce are omitted.
    /// PREEMPTION is always realized.
    pub fn migration_classes(&self) -> BTreeSet<MigrationClass> {
        self.table
            .iter()
            .flat_map(|classes| {
                classes
                    .iter()
                    .filter(|(_, dests)| !dests.is_empty())
                    .map(|(class, _)| *class)
            })
            .collect()
    }

    fn read_descriptor(cpu: usize, index_dir: &Path) -> Result<CacheDescriptor> {
        let read_attr = |name: &str| -> Result<String> {
            let path = index_dir.join(name);
            fs::read_to_string(&path)
                .map(|s| s.trim().to_string())
                .map_err(|source| TopologyError::AttributeRead { path, source })
        };

        let level_raw = read_attr("level")?;
        let level: u32 = level_raw
            .parse()
            .map_err(|_| TopologyError::AttributeParse {
                path: index_dir.join("level"),
                detail: format!("'{level_raw}' is not a cache level"),
            })?;
        let kind = CacheKind::from_sysfs(&read_attr("type")?);
        let shared_raw = read_attr("shared_cpu_list")?;
        let shared_cpus = cpulist::parse(&shared_raw).map_err(|source| {
            TopologyError::SharedCpus { cpu, level, source }
        })?;

        debug!(cpu, level, ?kind, "discovered cache descriptor");

        Ok(CacheDescriptor {
            cpu,
            level,
            kind,
            shared_cpus,
        })
    }

    /// Build the model from per-processor descriptor lists (fresh
    /// discovery or a deserialized snapshot).
    fn from_descriptors(mut caches: Vec<Vec<CacheDescriptor>>) -> Self {
        // Classification walks descriptors front to back; stable sort
        // keeps discovery order as the tie-break within a level.
        for descriptors in &mut caches {
            descriptors.sort_by_key(|d| d.level);
        }

        let table = Self::build_table(&caches);
        Self { caches, table }
    }

    /// One-time O(P*C) pass partitioning, for every source processor,
    /// the other processors into destination sets keyed by class. A
    /// processor claimed by a closer level is never reassigned; MEMORY
    /// takes the remainder; the source itself belongs to PREEMPTION
    /// exclusively.
    fn build_table(caches: &[Vec<CacheDescriptor>]) -> MigrationTable {
        let cpus = caches.len();
        let mut table = Vec::with_capacity(cpus);

        for cpu in 0..cpus {
            let mut classes: BTreeMap<MigrationClass, BTreeSet<usize>> = BTreeMap::new();
            let mut remaining: BTreeSet<usize> = (0..cpus).filter(|&c| c != cpu).collect();

            for descriptor in &caches[cpu] {
                if !descriptor.kind.gates_migration() {
                    continue;
                }
                let class = MigrationClass::Cache(descriptor.level);
                let dests = classes.entry(class).or_default();
                let claimed: Vec<usize> = remaining
                    .iter()
                    .copied()
                    .filter(|c| descriptor.shared_cpus.contains(c))
                    .collect();
                for c in claimed {
                    remaining.remove(&c);
                    dests.insert(c);
                }
            }

            classes.insert(MigrationClass::Memory, remaining);
            classes.insert(
                MigrationClass::Preemption,
                BTreeSet::from([cpu]),
            );
            table.push(classes);
        }

        table
    }
}
