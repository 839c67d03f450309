//! vcdmigrate Core Library
//!
//! This crate provides the core functionality for moving VMs from vCloud
//! Director to Google Compute Engine.
//!
//! # Overview
//!
//! Each VM's vApp is captured as a template, exported to OVF with `ovftool`,
//! patched so the importer accepts it, staged in Cloud Storage and imported
//! with `gcloud`. The main entry point is [`migrate_all`].
//!
//! # Modules
//!
//! - [`error`] - Error types and Result alias
//! - [`config`] - YAML migration configuration
//! - [`table`] - Fixed-width report parsing (`vcd search` output)
//! - [`ovf`] - Removing the `VirtualSystemCollection` wrapper from descriptors
//! - [`manifest`] - Refreshing the descriptor digest in `.mf` manifests
//! - [`command`] - Running external tools
//! - [`vcd`], [`ovftool`], [`gcloud`] - Per-tool steps
//! - [`migrate`] - Orchestrator running the steps for each VM
//!
//! # Quick Start
//!
//! ```no_run
//! use vcdmigrate_core::{migrate_all, MigrateOptions, MigrationConfig, SystemRunner};
//! use std::path::Path;
//!
//! let config = MigrationConfig::load(Path::new("config.yaml")).unwrap();
//! migrate_all(&mut SystemRunner, &config, &MigrateOptions::default(), None).unwrap();
//! ```

pub mod command;
pub mod config;
pub mod error;
mod fsutil;
pub mod gcloud;
pub mod manifest;
pub mod migrate;
pub mod ovf;
pub mod ovftool;
pub mod table;
pub mod vcd;

pub use error::{Error, Result};

pub use command::{CommandOutput, CommandRunner, DryRunner, Invocation, SystemRunner};
pub use config::MigrationConfig;
pub use migrate::{
    migrate_all, migrate_vm, MigrateOptions, MigrationPhase, MigrationProgress,
    MigrationSummary, ProgressCallback, ToolPaths, VmReport,
};
pub use ovf::{flatten_descriptor, FlattenMode, FlattenOutcome};
pub use table::{parse_table, ColumnLayout, Record};
