use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use cbng_provision_core::{ProvisionConfig, ProvisionError};
use tracing::{info, info_span};

use crate::artifact::install;
use crate::databases::build_derived;
use crate::fetch::ensure_archive_present;
use crate::finalize::finalize;
use crate::fs_utils::remove_dir_all_if_exists;
use crate::receipts::{read_provision_receipt, remove_provision_receipt, write_provision_receipt};
use crate::verify::verify_archive;
use crate::{
    current_unix_timestamp, DatabaseDigest, IntegrityExpectation, PipelineStage,
    ProvisionLayout, ProvisionOptions, ProvisionOutcome, ProvisionReceipt, ProvisionRuntime,
    ProvisionSummary,
};

pub fn provision_workspace<R>(
    config: &ProvisionConfig,
    options: ProvisionOptions,
    runtime: &mut R,
) -> Result<ProvisionOutcome>
where
    R: ProvisionRuntime + ?Sized,
{
    provision_workspace_with_observer(config, options, runtime, |_| {})
}

/// Runs fetch, verify, install, build and finalize in order. `observe` is
/// called as each stage starts.
pub fn provision_workspace_with_observer<R, O>(
    config: &ProvisionConfig,
    options: ProvisionOptions,
    runtime: &mut R,
    mut observe: O,
) -> Result<ProvisionOutcome>
where
    R: ProvisionRuntime + ?Sized,
    O: FnMut(PipelineStage),
{
    config.validate()?;
    let mut config = config.clone();
    config.paths.workspace = resolve_workspace_dir(&config.paths.workspace)?;
    ensure_staging_is_disposable(&config)?;

    let layout = ProvisionLayout::from_config(&config)?;
    let version = config.version()?;
    let url = config.archive_url()?;
    let archive_type = config.archive_type()?;
    let policy = options.rebuild.unwrap_or(config.databases.rebuild);

    let existing = read_provision_receipt(&layout)?;
    if let Some(receipt) = &existing {
        let same_version =
            receipt.release == version.release.to_string() && receipt.patch == version.patch;
        // Copying never replaces existing entries, so another release's payload
        // would survive under a receipt naming this one.
        if !same_version {
            return Err(ProvisionError::StaleWorkspace {
                path: layout.workspace_dir().to_path_buf(),
                installed: format!("{}-{}", receipt.release, receipt.patch),
                requested: version.to_string(),
            }
            .into());
        }
        if layout.marker_path().is_file() && !options.force {
            info!(
                version = %version,
                workspace = %layout.workspace_dir().display(),
                "workspace already provisioned"
            );
            return Ok(ProvisionOutcome::AlreadyProvisioned {
                receipt: receipt.clone(),
            });
        }
    }
    if existing.is_some() || options.force {
        reset_provision_state(&layout)?;
    }

    info!(
        package = %config.package.name,
        version = %version,
        workspace = %layout.workspace_dir().display(),
        "provisioning workspace"
    );

    let fetch = run_stage(PipelineStage::Fetch, &mut observe, || {
        ensure_archive_present(&url, layout.archive_path(), &mut *runtime)
    })?;

    let expectation = IntegrityExpectation {
        sha256: config.package.sha256.as_deref(),
        signature: config.package.signature.as_deref(),
        public_key: config.package.public_key.as_deref(),
    };
    let verification = run_stage(PipelineStage::Verify, &mut observe, || {
        verify_archive(layout.archive_path(), expectation)
    })?;

    let install_report = run_stage(PipelineStage::Install, &mut observe, || {
        install(
            &layout,
            archive_type,
            &config.layout.executables,
            &mut *runtime,
        )
    })?;

    let databases = run_stage(PipelineStage::Build, &mut observe, || {
        build_derived(
            &layout,
            &config.databases.builder,
            &config.databases.pairs,
            policy,
            &mut *runtime,
        )
    })?;

    let receipt_path = run_stage(PipelineStage::Finalize, &mut observe, || {
        finalize(&layout)?;
        let receipt = ProvisionReceipt {
            package: config.package.name.clone(),
            release: version.release.to_string(),
            patch: version.patch.clone(),
            archive_url: url.clone(),
            archive_sha256: verification.sha256.clone(),
            databases: databases
                .iter()
                .map(|outcome| DatabaseDigest {
                    target: outcome.target.clone(),
                    source_sha256: outcome.source_sha256.clone(),
                })
                .collect(),
            provisioned_at_unix: current_unix_timestamp()?,
        };
        write_provision_receipt(&layout, &receipt)
    })?;

    info!(receipt = %receipt_path.display(), "workspace provisioned");
    Ok(ProvisionOutcome::Provisioned(Box::new(ProvisionSummary {
        fetch,
        verification,
        install: install_report,
        databases,
        marker_path: layout.marker_path(),
        receipt_path,
    })))
}

fn run_stage<T, O, F>(stage: PipelineStage, observe: &mut O, work: F) -> Result<T>
where
    O: FnMut(PipelineStage),
    F: FnOnce() -> Result<T>,
{
    observe(stage);
    let _span = info_span!("stage", name = stage.as_str()).entered();
    work().with_context(|| format!("stage {} failed", stage.as_str()))
}

fn resolve_workspace_dir(workspace: &Path) -> Result<PathBuf> {
    match fs::metadata(workspace) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(anyhow!(
                "workspace path is not a directory: {}",
                workspace.display()
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(anyhow!(
                "workspace directory does not exist: {}",
                workspace.display()
            ));
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to stat workspace: {}", workspace.display()));
        }
    }
    fs::canonicalize(workspace)
        .with_context(|| format!("failed to resolve workspace: {}", workspace.display()))
}

/// Staging is deleted by finalize, so it must hold neither the workspace nor
/// the archive.
fn ensure_staging_is_disposable(config: &ProvisionConfig) -> Result<()> {
    let staging = resolve_existing_prefix(&config.paths.staging)?;
    let workspace = &config.paths.workspace;
    if workspace.starts_with(&staging) {
        return Err(ProvisionError::InvalidConfig(format!(
            "paths.staging ({}) must not contain paths.workspace ({}); staging is deleted after install",
            staging.display(),
            workspace.display()
        ))
        .into());
    }

    let archive = resolve_existing_prefix(&config.archive_path()?)?;
    if archive.starts_with(&staging) {
        return Err(ProvisionError::InvalidConfig(format!(
            "archive path ({}) must not be inside paths.staging ({})",
            archive.display(),
            staging.display()
        ))
        .into());
    }
    Ok(())
}

/// Canonicalizes the longest existing ancestor of `path` and re-appends the
/// components that do not exist yet.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to read current directory")?
            .join(path)
    };

    let mut missing = Vec::new();
    let mut cursor = absolute.as_path();
    loop {
        match fs::canonicalize(cursor) {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let (Some(name), Some(parent)) = (cursor.file_name(), cursor.parent()) else {
                    return Ok(absolute.clone());
                };
                missing.push(name.to_os_string());
                cursor = parent;
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to resolve {}", cursor.display()));
            }
        }
    }
}

/// Drops the receipt and package marker so a forced run can
/// finalize again.
fn reset_provision_state(layout: &ProvisionLayout) -> Result<()> {
    let marker_dir = layout.marker_dir();
    remove_dir_all_if_exists(&marker_dir)
        .with_context(|| format!("failed to remove package marker: {}", marker_dir.display()))?;
    if remove_provision_receipt(layout)? {
        info!("cleared previous provision receipt");
    }
    Ok(())
}
