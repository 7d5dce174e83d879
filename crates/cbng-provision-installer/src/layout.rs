use anyhow::Result;
use cbng_provision_core::ProvisionConfig;
use std::path::{Path, PathBuf};

const STATE_DIR_NAME: &str = ".cbng-provision";

/// Every filesystem location the pipeline touches, resolved once from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionLayout {
    archive_path: PathBuf,
    staging_dir: PathBuf,
    workspace_dir: PathBuf,
    primary_binary: String,
    payload_root: PathBuf,
    data_dir: PathBuf,
    marker_dir: String,
    marker_file: String,
}

impl ProvisionLayout {
    pub fn from_config(config: &ProvisionConfig) -> Result<Self> {
        Ok(Self {
            archive_path: config.archive_path()?,
            staging_dir: config.paths.staging.clone(),
            workspace_dir: config.paths.workspace.clone(),
            primary_binary: config.layout.primary_binary.clone(),
            payload_root: PathBuf::from(&config.layout.payload_root),
            data_dir: PathBuf::from(&config.databases.data_dir),
            marker_dir: config.layout.marker_dir.clone(),
            marker_file: config.layout.marker_file.clone(),
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Presence of the primary binary marks a completed extraction.
    pub fn sentinel_path(&self) -> PathBuf {
        self.staging_dir
            .join("usr")
            .join("bin")
            .join(&self.primary_binary)
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.staging_dir.join(&self.payload_root)
    }

    pub fn deb_scratch_dir(&self) -> PathBuf {
        self.staging_dir.join(".cbng-provision-deb")
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn workspace_entry(&self, name: &str) -> PathBuf {
        self.workspace_dir.join(name)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.workspace_dir.join(&self.data_dir)
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.workspace_dir.join(&self.marker_dir)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.marker_dir().join(&self.marker_file)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.workspace_dir.join(STATE_DIR_NAME)
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.state_dir().join("provision.receipt")
    }

    pub fn stamps_dir(&self) -> PathBuf {
        self.state_dir().join("databases")
    }

    pub fn stamp_path(&self, target: &str) -> PathBuf {
        self.stamps_dir().join(format!("{target}.stamp"))
    }
}
