use std::fs;
use std::io;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use cbng_provision_core::{DatabasePair, RebuildPolicy};
use cbng_provision_security::sha256_hex_file;
use tracing::{info, info_span};

use crate::{DatabaseOutcome, DatabaseStatus, ProvisionLayout, ProvisionRuntime};

/// Runs `builder` once per pair, strictly in order, stopping at the first
/// failure. Output left behind by a failed run is not cleaned up.
pub fn build_derived<R>(
    layout: &ProvisionLayout,
    builder: &str,
    pairs: &[DatabasePair],
    policy: RebuildPolicy,
    runtime: &mut R,
) -> Result<Vec<DatabaseOutcome>>
where
    R: ProvisionRuntime + ?Sized,
{
    let builder_path = layout.workspace_entry(builder);
    let mut outcomes = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let _span = info_span!("database", target = %pair.target, source = %pair.source).entered();
        let target_path = layout.data_path(&pair.target);
        let source_path = layout.data_path(&pair.source);

        if !source_path.is_file() {
            return Err(anyhow!(
                "training data for database '{}' is missing: {}",
                pair.target,
                source_path.display()
            ));
        }
        let source_sha256 = sha256_hex_file(&source_path)?;

        if policy == RebuildPolicy::WhenSourceChanged
            && target_path.is_file()
            && read_stamp(layout, &pair.target)?.as_deref() == Some(source_sha256.as_str())
        {
            info!("database is up to date, skipping rebuild");
            outcomes.push(DatabaseOutcome {
                target: pair.target.clone(),
                source: pair.source.clone(),
                source_sha256,
                status: DatabaseStatus::UpToDate,
            });
            continue;
        }

        let mut command = Command::new(&builder_path);
        command
            .arg(&target_path)
            .arg(&source_path)
            .current_dir(layout.workspace_dir());
        let context = format!(
            "failed to build database '{}' from '{}'",
            pair.target, pair.source
        );
        info!(builder = %builder_path.display(), "building database");
        runtime.run_command(&mut command, &context)?;

        write_stamp(layout, &pair.target, &source_sha256)?;
        outcomes.push(DatabaseOutcome {
            target: pair.target.clone(),
            source: pair.source.clone(),
            source_sha256,
            status: DatabaseStatus::Built,
        });
    }

    Ok(outcomes)
}

pub fn read_stamp(layout: &ProvisionLayout, target: &str) -> Result<Option<String>> {
    let path = layout.stamp_path(target);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read stamp: {}", path.display()))
        }
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

fn write_stamp(layout: &ProvisionLayout, target: &str, source_sha256: &str) -> Result<()> {
    let dir = layout.stamps_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create stamp dir: {}", dir.display()))?;
    let path = layout.stamp_path(target);
    fs::write(&path, format!("{source_sha256}\n"))
        .with_context(|| format!("failed to write stamp: {}", path.display()))
}
