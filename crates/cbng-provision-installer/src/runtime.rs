use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use cbng_provision_core::ProvisionError;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;

/// Side-effecting capabilities the pipeline needs from its host.
///
/// `SystemRuntime` talks to the network and spawns real processes; tests
/// substitute fakes that record calls.
pub trait ProvisionRuntime {
    /// Writes the response body for `url` to `out_path`, returning the byte
    /// count. Must fail on any non-success HTTP status.
    fn download(&mut self, url: &str, out_path: &Path) -> Result<u64>;

    /// Runs `command` to completion; a non-zero exit is an error carrying
    /// captured output.
    fn run_command(&mut self, command: &mut Command, context_message: &str) -> Result<()>;
}

pub struct SystemRuntime {
    client: Client,
}

impl SystemRuntime {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("cbng-provision/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(10))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl ProvisionRuntime for SystemRuntime {
    fn download(&mut self, url: &str, out_path: &Path) -> Result<u64> {
        debug!(url, path = %out_path.display(), "starting download");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport_error(url, &err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::Transport {
                url: url.to_string(),
                reason: format!("HTTP status {status}"),
            }
            .into());
        }

        let mut file = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|err| transport_error(url, &err))?;
        file.flush()
            .and_then(|()| file.sync_all())
            .with_context(|| format!("failed to flush {}", out_path.display()))?;
        Ok(bytes)
    }

    fn run_command(&mut self, command: &mut Command, context_message: &str) -> Result<()> {
        run_command(command, context_message)
    }
}

pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    debug!(command = ?command, "running command");
    let output = command
        .output()
        .map_err(|source| ProvisionError::CommandSpawn {
            context: context_message.to_string(),
            program: format!("{command:?}"),
            source,
        })?;
    if output.status.success() {
        return Ok(());
    }

    Err(ProvisionError::CommandFailed {
        context: context_message.to_string(),
        status: output.status.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
    .into())
}

pub(crate) fn error_chain_has_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
    })
}

fn transport_error(url: &str, err: &reqwest::Error) -> anyhow::Error {
    let mut reason = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    ProvisionError::Transport {
        url: url.to_string(),
        reason,
    }
    .into()
}
