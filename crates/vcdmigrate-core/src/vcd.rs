//! vCloud Director steps, driven through the `vcd` CLI.

use tracing::{info, warn};

use crate::command::{CommandRunner, Invocation};
use crate::config::MigrationConfig;
use crate::error::{Error, Result};
use crate::table::parse_table;

/// Column of `vcd search vm` holding the vApp a VM belongs to.
pub const CONTAINER_COLUMN: &str = "containerName";

/// Marker `vcd vapp capture` prints when the template is already in the catalog.
const ALREADY_EXISTS: &str = "already exists";

/// Log in and select the virtual datacenter.
pub fn login<R>(runner: &mut R, program: &str, config: &MigrationConfig) -> Result<()>
where
    R: CommandRunner + ?Sized,
{
    info!(host = %config.vcloud_url, org = %config.org, user = %config.login, "logging in to vCloud Director");

    let login = Invocation::new(program)
        .args([
            "login",
            config.vcloud_url.as_str(),
            config.org.as_str(),
            config.login.as_str(),
            "-p",
            config.password.as_str(),
        ])
        .secret(config.password.as_str())
        .read_only();
    runner.run(&login)?.check(&login)?;

    let use_vdc = Invocation::new(program)
        .args(["vdc", "use", config.vdc.as_str()])
        .read_only();
    runner.run(&use_vdc)?.check(&use_vdc)?;
    Ok(())
}

/// Build the search for a non-template VM named `vm`.
pub fn search_invocation(program: &str, vm: &str) -> Invocation {
    Invocation::new(program)
        .args(["search", "vm", "-f"])
        .arg(format!("name=={vm};isVAppTemplate==false"))
        .capture()
        .read_only()
}

/// Find the name of the vApp that contains `vm`.
///
/// The search must match exactly one VM.
pub fn resolve_template_name<R>(runner: &mut R, program: &str, vm: &str) -> Result<String>
where
    R: CommandRunner + ?Sized,
{
    let search = search_invocation(program, vm);
    let output = runner.run(&search)?.check(&search)?;

    let mut records = parse_table(output.stdout.lines())?;
    if records.len() != 1 {
        return Err(Error::Cardinality {
            vm: vm.to_string(),
            count: records.len(),
            records,
        });
    }

    let record = records.remove(0);
    let name = record.get(CONTAINER_COLUMN).ok_or_else(|| {
        Error::format(format!(
            "search output has no '{CONTAINER_COLUMN}' column (columns: {})",
            record.keys().collect::<Vec<_>>().join(", ")
        ))
    })?;
    if name.is_empty() {
        return Err(Error::format(format!("VM '{vm}' has an empty {CONTAINER_COLUMN}")));
    }

    info!(vm, vapp = name, "resolved vApp");
    Ok(name.to_string())
}

/// Outcome of a template capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new template was captured.
    Created,
    /// The catalog already held the template.
    AlreadyExists,
}

/// Build the capture of `vapp` into `catalog`.
///
/// `-i` captures an identical copy, so the vApp does not need powering off.
pub fn capture_invocation(program: &str, vapp: &str, catalog: &str) -> Invocation {
    Invocation::new(program)
        .args(["vapp", "capture", "-i", vapp, catalog])
        .capture()
}

/// Capture `vapp` as a template in `catalog`, accepting an existing one.
pub fn capture_template<R>(runner: &mut R, program: &str, vapp: &str, catalog: &str) -> Result<CaptureOutcome>
where
    R: CommandRunner + ?Sized,
{
    info!(vapp, catalog, "capturing vApp template");

    let capture = capture_invocation(program, vapp, catalog);
    let output = runner.run(&capture)?;

    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        info!(target: "vcd", "{line}");
    }

    if output.stderr.contains(ALREADY_EXISTS) {
        warn!(vapp, catalog, "template already exists, skipping capture");
        return Ok(CaptureOutcome::AlreadyExists);
    }

    output.check(&capture)?;
    Ok(CaptureOutcome::Created)
}
