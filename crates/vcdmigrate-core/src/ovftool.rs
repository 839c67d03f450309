//! Template export with VMware `ovftool`.

use std::path::Path;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::info;

use crate::command::{CommandRunner, Invocation};
use crate::config::MigrationConfig;
use crate::error::Result;

/// Default location of the `ovftool` binary, relative to the working directory.
pub const DEFAULT_OVFTOOL: &str = "ovftool/ovftool";

/// Characters left as-is in locator components (RFC 3986 unreserved).
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Build the `vcloud://` source locator for a vApp template.
pub fn vcloud_locator(config: &MigrationConfig, vapp: &str) -> String {
    format!(
        "vcloud://{}:{}@{}?org={}&vdc={}&catalog={}&vappTemplate={}",
        encode(&config.login),
        encode(&config.password),
        config.vcloud_url,
        encode(&config.org),
        encode(&config.vdc),
        encode(&config.catalog),
        encode(vapp)
    )
}

/// Build the export of `vapp` to the descriptor path `target`.
pub fn export_invocation(program: &str, config: &MigrationConfig, vapp: &str, target: &Path) -> Invocation {
    Invocation::new(program)
        .arg(vcloud_locator(config, vapp))
        .arg(target.to_string_lossy())
        .secret(encode(&config.password))
        .secret(config.password.as_str())
}

/// Export the vApp template `vapp` to `target` (a `.ovf` path).
pub fn export<R>(runner: &mut R, program: &str, config: &MigrationConfig, vapp: &str, target: &Path) -> Result<()>
where
    R: CommandRunner + ?Sized,
{
    info!(vapp, target = %target.display(), "exporting template");
    let export = export_invocation(program, config, vapp, target);
    runner.run(&export)?.check(&export)?;
    Ok(())
}
