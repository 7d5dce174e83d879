use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::archive::ArchiveType;
use crate::error::ProvisionError;
use crate::version::PinnedVersion;

pub const DEFAULT_URL_TEMPLATE: &str = "https://launchpad.net/~damianzaremba/+archive/ubuntu/cluebotng-core/+files/cluebotng-core_{release}-{patch}_amd64.deb";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    pub package: PackageSection,
    pub paths: PathsSection,
    pub layout: LayoutSection,
    pub databases: DatabasesSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageSection {
    pub name: String,
    pub release: String,
    pub patch: String,
    pub url_template: String,
    pub archive: Option<String>,
    pub sha256: Option<String>,
    pub signature: Option<String>,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsSection {
    pub archive: String,
    pub staging: PathBuf,
    pub workspace: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutSection {
    pub primary_binary: String,
    pub payload_root: String,
    pub executables: Vec<String>,
    pub marker_dir: String,
    pub marker_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabasesSection {
    pub builder: String,
    pub data_dir: String,
    pub rebuild: RebuildPolicy,
    pub pairs: Vec<DatabasePair>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabasePair {
    pub target: String,
    pub source: String,
}

impl DatabasePair {
    pub fn new(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildPolicy {
    #[default]
    Always,
    WhenSourceChanged,
}

impl RebuildPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::WhenSourceChanged => "when-source-changed",
        }
    }
}

impl Default for PackageSection {
    fn default() -> Self {
        Self {
            name: "cluebotng-core".to_string(),
            release: "1.0.3".to_string(),
            patch: "3".to_string(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            archive: None,
            sha256: None,
            signature: None,
            public_key: None,
        }
    }
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            archive: "/tmp/cluebotng-core-{release}-{patch}.amd64.deb".to_string(),
            staging: PathBuf::from("/tmp/apt"),
            workspace: PathBuf::from("/workspace"),
        }
    }
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self {
            primary_binary: "cluebotng".to_string(),
            payload_root: "opt/cbng-core".to_string(),
            executables: ["cluebotng", "create_ann", "create_bayes_db", "print_bayes_db"]
                .into_iter()
                .map(ToOwned::to_owned)
                .collect(),
            marker_dir: "cluebotng_core".to_string(),
            marker_file: "__init__.py".to_string(),
        }
    }
}

impl Default for DatabasesSection {
    fn default() -> Self {
        Self {
            builder: "create_bayes_db".to_string(),
            data_dir: "data".to_string(),
            rebuild: RebuildPolicy::Always,
            pairs: vec![
                DatabasePair::new("bayes.db", "main_bayes_train.dat"),
                DatabasePair::new("two_bayes.db", "two_bayes_train.dat"),
            ],
        }
    }
}

impl ProvisionConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self =
            toml::from_str(input).context("failed to parse provision config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read provision config: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid provision config: {}", path.display()))
    }

    pub fn version(&self) -> anyhow::Result<PinnedVersion> {
        PinnedVersion::new(&self.package.release, &self.package.patch)
    }

    pub fn archive_url(&self) -> anyhow::Result<String> {
        Ok(self.version()?.render(&self.package.url_template))
    }

    pub fn archive_path(&self) -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from(self.version()?.render(&self.paths.archive)))
    }

    pub fn archive_type(&self) -> anyhow::Result<ArchiveType> {
        if let Some(archive) = &self.package.archive {
            return ArchiveType::parse(archive).ok_or_else(|| {
                anyhow!(
                    "unsupported archive type '{archive}' for package '{}'; supported: deb, tar.gz, tar.xz, tar.zst, zip",
                    self.package.name
                )
            });
        }

        let url = self.archive_url()?;
        ArchiveType::infer_from_url(&url).ok_or_else(|| {
            anyhow!(
                "could not infer archive type from URL '{url}' for package '{}'; set package.archive explicitly",
                self.package.name
            )
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.version().map_err(|err| invalid(format!("{err:#}")))?;

        if self.package.name.trim().is_empty() {
            return Err(invalid("package.name must not be empty"));
        }
        if !self.package.url_template.starts_with("https://")
            && !self.package.url_template.starts_with("http://")
        {
            return Err(invalid(format!(
                "package.url_template must be an http(s) URL: {}",
                self.package.url_template
            )));
        }
        self.archive_type()
            .map_err(|err| invalid(format!("{err:#}")))?;

        if let Some(sha256) = &self.package.sha256 {
            if sha256.len() != 64 || !sha256.chars().all(|ch| ch.is_ascii_hexdigit()) {
                return Err(invalid(format!(
                    "package.sha256 must be 64 hex characters: {sha256}"
                )));
            }
        }
        if self.package.signature.is_some() && self.package.public_key.is_none() {
            return Err(invalid("package.signature requires package.public_key"));
        }

        if self.paths.archive.trim().is_empty() {
            return Err(invalid("paths.archive must not be empty"));
        }
        if self.paths.staging.as_os_str().is_empty() || self.paths.workspace.as_os_str().is_empty()
        {
            return Err(invalid("paths.staging and paths.workspace must not be empty"));
        }
        if self.paths.staging == self.paths.workspace {
            return Err(invalid(
                "paths.staging must differ from paths.workspace; staging is deleted after install",
            ));
        }

        validate_entry_name("layout.primary_binary", &self.layout.primary_binary)?;
        validate_relative_path("layout.payload_root", &self.layout.payload_root)?;
        validate_entry_name("layout.marker_dir", &self.layout.marker_dir)?;
        validate_entry_name("layout.marker_file", &self.layout.marker_file)?;
        let mut seen = HashSet::new();
        for executable in &self.layout.executables {
            validate_entry_name("layout.executables", executable)?;
            if !seen.insert(executable.as_str()) {
                return Err(invalid(format!(
                    "duplicate executable '{executable}' in layout.executables"
                )));
            }
        }

        validate_entry_name("databases.builder", &self.databases.builder)?;
        validate_relative_path("databases.data_dir", &self.databases.data_dir)?;
        let mut targets = HashSet::new();
        for pair in &self.databases.pairs {
            validate_entry_name("databases.pairs.target", &pair.target)?;
            validate_entry_name("databases.pairs.source", &pair.source)?;
            if pair.target == pair.source {
                return Err(invalid(format!(
                    "database '{}' must not be built from itself",
                    pair.target
                )));
            }
            if !targets.insert(pair.target.as_str()) {
                return Err(invalid(format!(
                    "duplicate database target '{}'",
                    pair.target
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    ProvisionError::InvalidConfig(message.into()).into()
}

fn validate_entry_name(field: &str, value: &str) -> anyhow::Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    if trimmed != value || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(invalid(format!(
            "{field} must be a single path component: '{value}'"
        )));
    }
    Ok(())
}

fn validate_relative_path(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    let path = Path::new(value);
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err(invalid(format!(
            "{field} must be a relative path without '..': '{value}'"
        )));
    }
    Ok(())
}
