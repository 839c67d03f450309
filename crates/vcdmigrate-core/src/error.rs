//! Error types for the vcdmigrate core library.

use std::path::PathBuf;

use crate::table::Record;

/// The main error type for vcdmigrate operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error with optional path context.
    #[error("I/O error{}: {source}", path.as_ref().map(|p| format!(" at '{}'", p.display())).unwrap_or_default())]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    /// Invalid or incomplete configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed tabular command output.
    #[error("format error: {message}")]
    Format { message: String },

    /// Error rewriting an OVF descriptor.
    #[error("OVF error: {message}")]
    Ovf { message: String },

    /// Error refreshing an OVF manifest.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// An external program could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// An external program exited unsuccessfully.
    #[error("command `{command}` failed ({}){}", describe_status(*status), describe_output(output))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    /// A VM search matched zero or several VMs.
    #[error("search for VM '{vm}' produced {count} results, expecting exactly 1: [{}]", describe_records(records))]
    Cardinality {
        vm: String,
        count: usize,
        records: Vec<Record>,
    },
}

/// A specialized Result type for vcdmigrate operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }

    /// Create an I/O error without path context.
    pub fn io_simple(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create an OVF error.
    pub fn ovf(message: impl Into<String>) -> Self {
        Self::Ovf {
            message: message.into(),
        }
    }

    /// Create a manifest error.
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::io_simple(source)
    }
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn describe_output(output: &str) -> String {
    let output = output.trim();
    if output.is_empty() {
        String::new()
    } else {
        format!(", output:\n{output}")
    }
}

fn describe_records(records: &[Record]) -> String {
    records
        .iter()
        .map(|r| format!("{{{r}}}"))
        .collect::<Vec<_>>()
        .join(", ")
}
