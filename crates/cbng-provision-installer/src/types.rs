use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Fetch,
    Verify,
    Install,
    Build,
    Finalize,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        Self::Fetch,
        Self::Verify,
        Self::Install,
        Self::Build,
        Self::Finalize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Install => "install",
            Self::Build => "build",
            Self::Finalize => "finalize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    CacheHit,
    Downloaded { bytes: u64 },
}

impl FetchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheHit => "cache-hit",
            Self::Downloaded { .. } => "downloaded",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegrityExpectation<'a> {
    pub sha256: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub public_key: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveVerification {
    pub sha256: String,
    pub checksum_verified: bool,
    pub signature_verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    AlreadyExtracted,
    Extracted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub extract: ExtractStatus,
    pub copy: CopyReport,
    pub executables: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    Built,
    UpToDate,
}

impl DatabaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::UpToDate => "up-to-date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOutcome {
    pub target: String,
    pub source: String,
    pub source_sha256: String,
    pub status: DatabaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseDigest {
    pub target: String,
    pub source_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReceipt {
    pub package: String,
    pub release: String,
    pub patch: String,
    pub archive_url: String,
    pub archive_sha256: String,
    pub databases: Vec<DatabaseDigest>,
    pub provisioned_at_unix: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSummary {
    pub fetch: FetchStatus,
    pub verification: ArchiveVerification,
    pub install: InstallReport,
    pub databases: Vec<DatabaseOutcome>,
    pub marker_path: PathBuf,
    pub receipt_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyProvisioned { receipt: ProvisionReceipt },
    Provisioned(Box<ProvisionSummary>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Re-run every stage even when a matching receipt exists.
    pub force: bool,
    /// Overrides `databases.rebuild` from config.
    pub rebuild: Option<cbng_provision_core::RebuildPolicy>,
}
