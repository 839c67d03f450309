//! vcdmigrate CLI - Move vCloud Director VMs to Google Compute Engine.

use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use vcdmigrate_core::command::OutputMode;
use vcdmigrate_core::manifest::{refresh_manifest, ManifestOutcome};
use vcdmigrate_core::ovftool::DEFAULT_OVFTOOL;
use vcdmigrate_core::{
    flatten_descriptor, migrate_all, parse_table, CommandOutput, CommandRunner, DryRunner,
    FlattenMode, FlattenOutcome, Invocation, MigrateOptions, MigrationConfig, MigrationPhase,
    MigrationProgress, SystemRunner, ToolPaths,
};

/// Migrate vCloud Director VMs to Google Compute Engine through OVF.
#[derive(Parser)]
#[command(name = "vcdmigrate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArg {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the VMs listed in the configuration.
    Migrate {
        #[command(flatten)]
        config: ConfigArg,

        /// Directory in which per-VM export directories are created.
        #[arg(short, long, default_value = ".")]
        work_dir: PathBuf,

        /// Migrate only this VM (repeatable). Must be listed in vm_list.
        #[arg(long = "vm", value_name = "NAME")]
        vms: Vec<String>,

        /// Path to the vcd binary.
        #[arg(long, default_value = "vcd")]
        vcd: String,

        /// Path to the ovftool binary.
        #[arg(long, default_value = DEFAULT_OVFTOOL)]
        ovftool: String,

        /// Path to the gcloud binary.
        #[arg(long, default_value = "gcloud")]
        gcloud: String,

        /// Only run read-only commands; log everything else.
        #[arg(long)]
        dry_run: bool,

        /// Flatten descriptors without checking their structure.
        #[arg(long)]
        permissive: bool,

        /// Suppress the progress spinner.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Remove the VirtualSystemCollection wrapper from an OVF descriptor in place.
    Flatten {
        /// Path to the OVF descriptor.
        ovf_file: PathBuf,

        /// Flatten without checking the descriptor structure.
        #[arg(long)]
        permissive: bool,
    },

    /// Parse saved `vcd search` output and print its records.
    ParseTable {
        /// File holding the output. Reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Load and validate the configuration.
    CheckConfig {
        #[command(flatten)]
        config: ConfigArg,
    },
}

fn flatten_mode(permissive: bool) -> FlattenMode {
    if permissive {
        FlattenMode::Permissive
    } else {
        FlattenMode::Strict
    }
}

/// Hides the spinner while a child writes straight to the terminal.
struct SuspendingRunner {
    inner: Box<dyn CommandRunner>,
    spinner: ProgressBar,
}

impl CommandRunner for SuspendingRunner {
    fn run(&mut self, invocation: &Invocation) -> vcdmigrate_core::Result<CommandOutput> {
        match invocation.mode() {
            OutputMode::Inherit => {
                let inner = &mut self.inner;
                self.spinner.suspend(|| inner.run(invocation))
            }
            OutputMode::Capture => self.inner.run(invocation),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Migrate {
            config,
            work_dir,
            vms,
            vcd,
            ovftool,
            gcloud,
            dry_run,
            permissive,
            quiet,
        } => {
            let options = MigrateOptions {
                work_dir,
                tools: ToolPaths {
                    vcd,
                    ovftool,
                    gcloud,
                },
                flatten_mode: flatten_mode(permissive),
                dry_run,
                only: vms,
            };
            run_migrate(&config.config, &options, quiet)?;
        }
        Commands::Flatten {
            ovf_file,
            permissive,
        } => {
            run_flatten(&ovf_file, flatten_mode(permissive))?;
        }
        Commands::ParseTable { file } => {
            run_parse_table(file.as_deref())?;
        }
        Commands::CheckConfig { config } => {
            check_config(&config.config)?;
        }
    }

    Ok(())
}

fn run_migrate(config_path: &Path, options: &MigrateOptions, quiet: bool) -> Result<()> {
    let config = MigrationConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if !quiet {
        println!("VM Migration");
        println!("------------");
        println!("Source:    {} (org {}, vdc {})", config.vcloud_url, config.org, config.vdc);
        println!("Catalog:   {}", config.catalog);
        println!("Bucket:    gs://{}", config.bucket);
        println!(
            "Target:    {} / {} / {} ({})",
            config.gcp_project, config.gcp_vpc, config.gcp_subnet, config.zone
        );
        if options.dry_run {
            println!("Mode:      dry run");
        }
        println!();
    }

    // Set up progress tracking
    let pb = if quiet {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?;
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };
    let spinner: Option<Arc<Mutex<ProgressBar>>> = pb.clone().map(|pb| Arc::new(Mutex::new(pb)));

    let callback: Option<vcdmigrate_core::ProgressCallback> = spinner.clone().map(|pb_arc| {
        Box::new(move |progress: MigrationProgress| {
            let Ok(pb) = pb_arc.lock() else {
                return;
            };
            let message = match (&progress.vm, progress.phase) {
                (_, MigrationPhase::Complete) => "Complete!".to_string(),
                (Some(vm), phase) => {
                    format!("[{}/{}] {vm}: {phase}...", progress.current_vm, progress.total_vms)
                }
                (None, phase) => format!("{phase}..."),
            };
            pb.set_message(message);
        }) as vcdmigrate_core::ProgressCallback
    });

    let mut runner: Box<dyn CommandRunner> = if options.dry_run {
        Box::new(DryRunner::new(SystemRunner))
    } else {
        Box::new(SystemRunner)
    };
    if let Some(pb) = pb {
        runner = Box::new(SuspendingRunner {
            inner: runner,
            spinner: pb,
        });
    }

    let result = migrate_all(runner.as_mut(), &config, options, callback);

    if let Some(pb_arc) = spinner {
        if let Ok(pb) = pb_arc.lock() {
            match &result {
                Ok(_) => pb.finish_with_message("Complete!"),
                Err(_) => pb.abandon_with_message("Failed"),
            }
        }
    }

    let summary = result?;

    if !quiet {
        println!();
        println!("Migration started for {} VM(s):", summary.migrated.len());
        for report in &summary.migrated {
            println!("  {} (from vApp {})", report.vm, report.vapp);
        }
    }

    Ok(())
}

fn run_flatten(ovf_file: &Path, mode: FlattenMode) -> Result<()> {
    match flatten_descriptor(ovf_file, mode)? {
        FlattenOutcome::Flattened { removed_lines } => {
            println!(
                "Removed VirtualSystemCollection from {} ({} lines dropped)",
                ovf_file.display(),
                removed_lines
            );
        }
        FlattenOutcome::Unchanged => {
            println!("{} has no VirtualSystemCollection, left unchanged", ovf_file.display());
            return Ok(());
        }
    }

    match refresh_manifest(ovf_file)? {
        ManifestOutcome::Updated { algorithm } => println!("Manifest digest updated ({algorithm:?})"),
        ManifestOutcome::Removed { algorithm } => {
            println!("Manifest entry removed (unsupported algorithm {algorithm})")
        }
        ManifestOutcome::NoEntry => println!("Manifest has no entry for the descriptor"),
        ManifestOutcome::Missing => {}
    }

    Ok(())
}

fn run_parse_table(file: Option<&Path>) -> Result<()> {
    let lines: Vec<String> = match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?
            .lines()
            .map(str::to_string)
            .collect(),
        None => io::stdin().lock().lines().collect::<io::Result<_>>()?,
    };

    let records = parse_table(&lines)?;
    info!(count = records.len(), "parsed records");

    for (i, record) in records.iter().enumerate() {
        println!("Record {}", i + 1);
        for (name, value) in record.iter() {
            println!("  {name}={value}");
        }
    }

    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = MigrationConfig::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    println!("Configuration OK: {}", config_path.display());
    println!();
    println!("Source:    {}@{} (org {}, vdc {})", config.login, config.vcloud_url, config.org, config.vdc);
    println!("Catalog:   {}", config.catalog);
    println!("Bucket:    gs://{}", config.bucket);
    println!("Project:   {}", config.gcp_project);
    println!("Network:   {} / {}", config.gcp_vpc, config.gcp_subnet);
    println!("Zone:      {}", config.zone);
    println!();

    if config.vm_list.is_empty() {
        println!("VMs:       None");
    } else {
        println!("VMs:");
        for (i, vm) in config.vm_list.iter().enumerate() {
            println!("  {}. {}", i + 1, vm);
        }
    }

    Ok(())
}
