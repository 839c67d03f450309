//! Migration orchestrator.
//!
//! This module runs the full migration for each configured VM, strictly one
//! step after another:
//! 1. Resolve the vApp that holds the VM (`vcd search`)
//! 2. Capture the vApp as a catalog template (`vcd vapp capture`)
//! 3. Export the template to `<work_dir>/<vm>/<vm>.ovf` (`ovftool`)
//! 4. Remove the `VirtualSystemCollection` wrapper and refresh the manifest
//! 5. Upload the package directory to Cloud Storage (`gcloud storage cp`)
//! 6. Delete the local package directory
//! 7. Start the Compute Engine import (`gcloud compute instances import`)
//!
//! The first failure aborts the whole run. VMs later in the list are left
//! untouched and nothing is rolled back.
//!
//! # Example
//!
//! ```no_run
//! use vcdmigrate_core::command::SystemRunner;
//! use vcdmigrate_core::config::MigrationConfig;
//! use vcdmigrate_core::migrate::{migrate_all, MigrateOptions};
//! use std::path::Path;
//!
//! let config = MigrationConfig::load(Path::new("config.yaml")).unwrap();
//! let summary = migrate_all(&mut SystemRunner, &config, &MigrateOptions::default(), None).unwrap();
//! println!("migrated {} VMs", summary.migrated.len());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use crate::command::CommandRunner;
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::manifest::{refresh_manifest, ManifestOutcome};
use crate::ovf::{flatten_descriptor, FlattenMode, FlattenOutcome};
use crate::ovftool::DEFAULT_OVFTOOL;
use crate::vcd::CaptureOutcome;
use crate::{gcloud, ovftool, vcd};

/// Programs used for each platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub vcd: String,
    pub ovftool: String,
    pub gcloud: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            vcd: "vcd".to_string(),
            ovftool: DEFAULT_OVFTOOL.to_string(),
            gcloud: "gcloud".to_string(),
        }
    }
}

/// Options for a migration run.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Directory in which per-VM package directories are created.
    pub work_dir: PathBuf,
    /// External programs.
    pub tools: ToolPaths,
    /// How the exported descriptor is flattened.
    pub flatten_mode: FlattenMode,
    /// Skip local file changes; pair with [`DryRunner`](crate::command::DryRunner).
    pub dry_run: bool,
    /// Restrict the run to these VMs. Empty means every VM in the config.
    pub only: Vec<String>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            tools: ToolPaths::default(),
            flatten_mode: FlattenMode::Strict,
            dry_run: false,
            only: Vec::new(),
        }
    }
}

/// Phase of the migration of one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Logging in to vCloud Director.
    LoggingIn,
    /// Looking up the VM's vApp.
    Resolving,
    /// Capturing the vApp template.
    Capturing,
    /// Exporting the template to OVF.
    Exporting,
    /// Flattening the descriptor.
    Flattening,
    /// Uploading the package.
    Uploading,
    /// Removing the local package.
    Cleaning,
    /// Starting the cloud import.
    Importing,
    /// All VMs done.
    Complete,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::LoggingIn => write!(f, "Logging in"),
            MigrationPhase::Resolving => write!(f, "Resolving vApp"),
            MigrationPhase::Capturing => write!(f, "Capturing template"),
            MigrationPhase::Exporting => write!(f, "Exporting"),
            MigrationPhase::Flattening => write!(f, "Flattening descriptor"),
            MigrationPhase::Uploading => write!(f, "Uploading"),
            MigrationPhase::Cleaning => write!(f, "Cleaning up"),
            MigrationPhase::Importing => write!(f, "Starting import"),
            MigrationPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Progress information for a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationProgress {
    /// Current phase.
    pub phase: MigrationPhase,
    /// VM being migrated, if any.
    pub vm: Option<String>,
    /// Position of the VM in the run (1-indexed, 0 before the first VM).
    pub current_vm: usize,
    /// Number of VMs in the run.
    pub total_vms: usize,
}

/// Type alias for the progress callback function.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send>;

/// What happened to one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmReport {
    pub vm: String,
    /// The vApp the template was captured from.
    pub vapp: String,
    pub capture: CaptureOutcome,
    /// `None` in dry runs.
    pub flatten: Option<FlattenOutcome>,
    /// `None` in dry runs.
    pub manifest: Option<ManifestOutcome>,
}

/// Result of a complete run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// VMs whose import was started, in order.
    pub migrated: Vec<VmReport>,
}

/// Pick the VMs to migrate, keeping the config order.
///
/// Every name in `only` must appear in the config's `vm_list`.
pub fn select_vms<'a>(config: &'a MigrationConfig, only: &[String]) -> Result<Vec<&'a str>> {
    if let Some(unknown) = only.iter().find(|vm| !config.vm_list.contains(vm)) {
        return Err(Error::config(format!("VM '{unknown}' is not in vm_list")));
    }
    Ok(config
        .vm_list
        .iter()
        .filter(|vm| only.is_empty() || only.contains(vm))
        .map(String::as_str)
        .collect())
}

/// Local directory that receives the export of `vm`.
pub fn package_dir(work_dir: &Path, vm: &str) -> PathBuf {
    work_dir.join(vm)
}

/// Descriptor path inside the package directory of `vm`.
pub fn descriptor_path(work_dir: &Path, vm: &str) -> PathBuf {
    package_dir(work_dir, vm).join(format!("{vm}.ovf"))
}

/// Migrate every selected VM.
///
/// Logs in once, then runs [`migrate_vm`] for each VM in order. The first
/// error stops the run.
pub fn migrate_all<R>(
    runner: &mut R,
    config: &MigrationConfig,
    options: &MigrateOptions,
    progress_callback: Option<ProgressCallback>,
) -> Result<MigrationSummary>
where
    R: CommandRunner + ?Sized,
{
    let report_progress = |progress: MigrationProgress| {
        if let Some(ref callback) = progress_callback {
            callback(progress);
        }
    };

    let vms = select_vms(config, &options.only)?;
    let total_vms = vms.len();

    report_progress(MigrationProgress {
        phase: MigrationPhase::LoggingIn,
        vm: None,
        current_vm: 0,
        total_vms,
    });
    vcd::login(runner, &options.tools.vcd, config)?;

    let mut summary = MigrationSummary::default();
    for (index, vm) in vms.iter().enumerate() {
        let _span = info_span!("vm", name = %vm).entered();
        info!("processing VM {}/{}", index + 1, total_vms);

        let report = migrate_vm(runner, config, options, vm, &|phase: MigrationPhase| {
            report_progress(MigrationProgress {
                phase,
                vm: Some(vm.to_string()),
                current_vm: index + 1,
                total_vms,
            })
        })?;
        summary.migrated.push(report);
    }

    report_progress(MigrationProgress {
        phase: MigrationPhase::Complete,
        vm: None,
        current_vm: total_vms,
        total_vms,
    });
    info!(count = summary.migrated.len(), "migration complete");
    Ok(summary)
}

/// Migrate a single VM. Assumes the vCloud session is already logged in.
pub fn migrate_vm<R>(
    runner: &mut R,
    config: &MigrationConfig,
    options: &MigrateOptions,
    vm: &str,
    on_phase: &dyn Fn(MigrationPhase),
) -> Result<VmReport>
where
    R: CommandRunner + ?Sized,
{
    let tools = &options.tools;

    on_phase(MigrationPhase::Resolving);
    let vapp = vcd::resolve_template_name(runner, &tools.vcd, vm)?;

    on_phase(MigrationPhase::Capturing);
    let capture = vcd::capture_template(runner, &tools.vcd, &vapp, &config.catalog)?;

    let dir = package_dir(&options.work_dir, vm);
    let descriptor = descriptor_path(&options.work_dir, vm);

    on_phase(MigrationPhase::Exporting);
    if !options.dry_run {
        // An existing directory is most likely a leftover from a failed run.
        fs::create_dir(&dir).map_err(|e| Error::io(e, &dir))?;
    }
    ovftool::export(runner, &tools.ovftool, config, &vapp, &descriptor)?;

    let (flatten, manifest) = if options.dry_run {
        (None, None)
    } else {
        on_phase(MigrationPhase::Flattening);
        let flatten = flatten_descriptor(&descriptor, options.flatten_mode)?;
        let manifest = refresh_manifest(&descriptor)?;
        (Some(flatten), Some(manifest))
    };

    on_phase(MigrationPhase::Uploading);
    gcloud::upload(runner, &tools.gcloud, config, &dir)?;

    if !options.dry_run {
        on_phase(MigrationPhase::Cleaning);
        fs::remove_dir_all(&dir).map_err(|e| Error::io(e, &dir))?;
        info!(dir = %dir.display(), "removed local package");
    }

    on_phase(MigrationPhase::Importing);
    gcloud::start_import(runner, &tools.gcloud, config, vm)?;

    Ok(VmReport {
        vm: vm.to_string(),
        vapp,
        capture,
        flatten,
        manifest,
    })
}
