//! Google Cloud steps, driven through the `gcloud` CLI.

use std::path::Path;

use tracing::info;

use crate::command::{CommandRunner, Invocation};
use crate::config::MigrationConfig;
use crate::error::Result;

/// Cloud Storage URI of the staged package for `vm`.
pub fn source_uri(config: &MigrationConfig, vm: &str) -> String {
    format!("gs://{}/{}", config.bucket, vm)
}

/// Build the recursive copy of `dir` into the bucket root.
pub fn upload_invocation(program: &str, config: &MigrationConfig, dir: &Path) -> Invocation {
    Invocation::new(program)
        .args(["storage", "cp", "--recursive"])
        .arg(dir.to_string_lossy())
        .arg(format!("gs://{}", config.bucket))
}

/// Upload the exported package directory.
///
/// `dir` is copied as a whole, so it lands at `gs://<bucket>/<dir name>/`.
pub fn upload<R>(runner: &mut R, program: &str, config: &MigrationConfig, dir: &Path) -> Result<()>
where
    R: CommandRunner + ?Sized,
{
    info!(dir = %dir.display(), bucket = %config.bucket, "uploading to bucket");
    let upload = upload_invocation(program, config, dir);
    runner.run(&upload)?.check(&upload)?;
    Ok(())
}

/// Build the Compute Engine import for `vm`.
pub fn import_invocation(program: &str, config: &MigrationConfig, vm: &str) -> Invocation {
    Invocation::new(program)
        .args(["compute", "instances", "import", vm])
        .arg(format!("--source-uri={}", source_uri(config, vm)))
        .args(["--project", config.gcp_project.as_str()])
        .args(["--network", config.gcp_vpc.as_str()])
        .args(["--subnet", config.gcp_subnet.as_str()])
        .args(["--zone", config.zone.as_str()])
}

/// Start importing the staged package as an instance named `vm`.
pub fn start_import<R>(runner: &mut R, program: &str, config: &MigrationConfig, vm: &str) -> Result<()>
where
    R: CommandRunner + ?Sized,
{
    info!(vm, source = %source_uri(config, vm), project = %config.gcp_project, "starting import");
    let import = import_invocation(program, config, vm);
    runner.run(&import)?.check(&import)?;
    Ok(())
}
