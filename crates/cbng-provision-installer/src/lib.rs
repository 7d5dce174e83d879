use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

mod artifact;
mod databases;
mod fetch;
mod finalize;
mod fs_utils;
mod layout;
mod pipeline;
mod receipts;
mod runtime;
mod types;
mod verify;

pub use artifact::{copy_payload, ensure_extracted, install, mark_executables, EXECUTABLE_MODE};
pub use databases::{build_derived, read_stamp};
pub use fetch::ensure_archive_present;
pub use finalize::{finalize, write_package_marker};
pub use layout::ProvisionLayout;
pub use pipeline::{provision_workspace, provision_workspace_with_observer};
pub use receipts::{read_provision_receipt, remove_provision_receipt, write_provision_receipt};
pub use runtime::{run_command, ProvisionRuntime, SystemRuntime};
pub use types::{
    ArchiveVerification, CopyReport, DatabaseDigest, DatabaseOutcome, DatabaseStatus,
    ExtractStatus, FetchStatus, InstallReport, IntegrityExpectation, PipelineStage,
    ProvisionOptions, ProvisionOutcome, ProvisionReceipt, ProvisionSummary,
};
pub use verify::verify_archive;

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
