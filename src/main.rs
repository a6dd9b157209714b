use anyhow::{Context, Result};
use clap::Parser;
use cpmd::cli::{Cli, Stage};
use cpmd::model::ModelOptions;
use cpmd::topology::CacheTopology;
use cpmd::{group, model};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Host label for completed file names: flag value or this machine's
/// hostname.
fn resolve_host(cli: &Cli) -> String {
    cli.host.clone().unwrap_or_else(|| {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string())
    })
}

/// Load the topology snapshot if one was given, otherwise discover the
/// running machine, and honor a save request either way.
fn resolve_topology(cli: &Cli) -> Result<CacheTopology> {
    let topo = match &cli.topology {
        Some(path) => CacheTopology::load_snapshot(path)?,
        None => CacheTopology::discover()?,
    };

    if let Some(path) = &cli.save_topology {
        topo.save_snapshot(path)?;
        eprintln!("saved topology snapshot to {}", path.display());
    }

    Ok(topo)
}

fn run_group(cli: &Cli, topo: &CacheTopology, host: &str) -> Result<()> {
    let report = group::group_traces(&cli.traces_dir, &cli.completed_dir, topo, host)
        .context("grouping stage failed")?;

    eprintln!(
        "grouped {} trace file(s) ({} failed):",
        report.files_processed, report.files_failed
    );
    for (class, count) in &report.records {
        eprintln!("  {class:<12} {count:>10} record(s)");
    }
    Ok(())
}

fn run_model(cli: &Cli) -> Result<()> {
    let opts = ModelOptions {
        clock_mhz: cli.clock_mhz,
        extent: cli.iqr_extent,
        sample_cap: cli.limit_samples,
    };
    let records = model::build_model(&cli.completed_dir, &cli.model_dir, &opts)
        .context("model stage failed")?;

    eprintln!(
        "wrote {} model record(s) to {}",
        records.len(),
        cli.model_dir.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let host = resolve_host(&cli);

    match cli.stage {
        Stage::All => {
            let topo = resolve_topology(&cli)?;
            eprintln!(
                "topology: {} processor(s), classes: {}",
                topo.processor_count(),
                topo.migration_classes()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            run_group(&cli, &topo, &host)?;
            run_model(&cli)?;
        }
        Stage::Group => {
            let topo = resolve_topology(&cli)?;
            run_group(&cli, &topo, &host)?;
        }
        Stage::Model => {
            // the model stage reclassifies nothing, so no topology is
            // needed; still honor an explicit save request
            if cli.save_topology.is_some() {
                resolve_topology(&cli)?;
            }
            run_model(&cli)?;
        }
    }

    Ok(())
}
