//! CLI argument parsing for cpmd

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Pipeline stages the driver can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Group raw traces, then build the model (default)
    All,
    /// Only split raw traces into per-class completed files
    Group,
    /// Only build the model from existing completed files
    Model,
}

#[derive(Parser, Debug)]
#[command(name = "cpmd")]
#[command(version)]
#[command(about = "Build empirical preemption/migration overhead models", long_about = None)]
pub struct Cli {
    /// Directory holding raw trace files
    #[arg(long = "traces", value_name = "DIR", default_value = "results/traces")]
    pub traces_dir: PathBuf,

    /// Directory for per-(class, wss) completed files
    #[arg(
        long = "completed",
        value_name = "DIR",
        default_value = "results/completed"
    )]
    pub completed_dir: PathBuf,

    /// Directory for the model output files
    #[arg(long = "model", value_name = "DIR", default_value = "results/model")]
    pub model_dir: PathBuf,

    /// Load the cache topology from a snapshot instead of discovering it
    #[arg(short = 't', long = "topology", value_name = "FILE")]
    pub topology: Option<PathBuf>,

    /// Save the cache topology (discovered or loaded) to a snapshot
    #[arg(long = "save-topology", value_name = "FILE")]
    pub save_topology: Option<PathBuf>,

    /// Host label encoded into completed file names (default: this
    /// machine's hostname)
    #[arg(long = "host", value_name = "NAME")]
    pub host: Option<String>,

    /// CPU clock in MHz for cycles-to-milliseconds conversion; 0 keeps
    /// raw cycles
    #[arg(short = 'u', long = "clock-mhz", value_name = "MHZ", default_value = "0.0")]
    pub clock_mhz: f64,

    /// IQR fence extension factor for outlier removal
    #[arg(long = "iqr-extent", value_name = "K", default_value = "1.5")]
    pub iqr_extent: f64,

    /// Use at most N records per bucket for the model statistics
    #[arg(long = "limit-samples", value_name = "N")]
    pub limit_samples: Option<usize>,

    /// Pipeline stage to run
    #[arg(long = "stage", value_enum, default_value = "all")]
    pub stage: Stage,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["cpmd"]);
        assert_eq!(cli.traces_dir, PathBuf::from("results/traces"));
        assert_eq!(cli.completed_dir, PathBuf::from("results/completed"));
        assert_eq!(cli.model_dir, PathBuf::from("results/model"));
        assert_eq!(cli.stage, Stage::All);
        assert_eq!(cli.clock_mhz, 0.0);
        assert_eq!(cli.iqr_extent, 1.5);
        assert!(cli.topology.is_none());
        assert!(cli.limit_samples.is_none());
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_stage_selection() {
        let cli = Cli::parse_from(["cpmd", "--stage", "group"]);
        assert_eq!(cli.stage, Stage::Group);
        let cli = Cli::parse_from(["cpmd", "--stage", "model"]);
        assert_eq!(cli.stage, Stage::Model);
    }

    #[test]
    fn test_cli_topology_paths() {
        let cli = Cli::parse_from([
            "cpmd",
            "-t",
            "topo.json",
            "--save-topology",
            "snapshot.json",
        ]);
        assert_eq!(cli.topology, Some(PathBuf::from("topo.json")));
        assert_eq!(cli.save_topology, Some(PathBuf::from("snapshot.json")));
    }

    #[test]
    fn test_cli_clock_mhz() {
        let cli = Cli::parse_from(["cpmd", "-u", "2266"]);
        assert_eq!(cli.clock_mhz, 2266.0);
    }

    #[test]
    fn test_cli_limit_samples() {
        let cli = Cli::parse_from(["cpmd", "--limit-samples", "5000"]);
        assert_eq!(cli.limit_samples, Some(5000));
    }

    #[test]
    fn test_cli_custom_extent() {
        let cli = Cli::parse_from(["cpmd", "--iqr-extent", "3.0"]);
        assert_eq!(cli.iqr_extent, 3.0);
    }
}
