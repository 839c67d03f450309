//! Migration configuration.
//!
//! The configuration is a YAML document:
//!
//! ```yaml
//! login: migrator
//! password: secret
//! vcloud_url: vcd.example.com
//! org: acme
//! vdc: acme-vdc
//! catalog: migration
//! vm_list:
//!   - web01
//!   - db01
//! bucket: acme-ovf-staging
//! gcp_project: acme-prod
//! gcp_vpc: default
//! gcp_subnet: default
//! zone: europe-west1-b
//! ```
//!
//! Every key is required.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Settings for a migration run.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// vCloud Director user name.
    pub login: String,
    /// vCloud Director password.
    pub password: String,
    /// vCloud Director host.
    pub vcloud_url: String,
    /// vCloud organization.
    pub org: String,
    /// Virtual datacenter holding the VMs.
    pub vdc: String,
    /// Catalog that receives the captured templates.
    pub catalog: String,
    /// VMs to migrate, in order.
    pub vm_list: Vec<String>,
    /// Cloud Storage bucket used for staging.
    pub bucket: String,
    /// Target GCP project.
    pub gcp_project: String,
    /// Target VPC network.
    pub gcp_vpc: String,
    /// Target subnet.
    pub gcp_subnet: String,
    /// Target zone.
    pub zone: String,
}

impl fmt::Debug for MigrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationConfig")
            .field("login", &self.login)
            .field("password", &"****")
            .field("vcloud_url", &self.vcloud_url)
            .field("org", &self.org)
            .field("vdc", &self.vdc)
            .field("catalog", &self.catalog)
            .field("vm_list", &self.vm_list)
            .field("bucket", &self.bucket)
            .field("gcp_project", &self.gcp_project)
            .field("gcp_vpc", &self.gcp_vpc)
            .field("gcp_subnet", &self.gcp_subnet)
            .field("zone", &self.zone)
            .finish()
    }
}

impl MigrationConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(e, path))?;
        Self::from_yaml(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), config_message(e))))
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("login", &self.login),
            ("vcloud_url", &self.vcloud_url),
            ("org", &self.org),
            ("vdc", &self.vdc),
            ("catalog", &self.catalog),
            ("bucket", &self.bucket),
            ("gcp_project", &self.gcp_project),
            ("gcp_vpc", &self.gcp_vpc),
            ("gcp_subnet", &self.gcp_subnet),
            ("zone", &self.zone),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(format!("'{key}' must not be empty")));
            }
        }

        for vm in &self.vm_list {
            validate_vm_name(vm)?;
        }
        Ok(())
    }
}

/// VM names become local directory names and bucket prefixes.
fn validate_vm_name(vm: &str) -> Result<()> {
    if vm.trim().is_empty() {
        return Err(Error::config("vm_list contains an empty name"));
    }
    if vm == "." || vm == ".." || vm.contains('/') || vm.contains('\\') {
        return Err(Error::config(format!(
            "invalid VM name '{vm}': names must not be '.', '..' or contain path separators"
        )));
    }
    Ok(())
}

fn config_message(err: Error) -> String {
    match err {
        Error::Config { message } => message,
        other => other.to_string(),
    }
}
