use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::{DatabaseDigest, ProvisionLayout, ProvisionReceipt};

pub fn write_provision_receipt(
    layout: &ProvisionLayout,
    receipt: &ProvisionReceipt,
) -> Result<PathBuf> {
    let mut payload = String::new();
    payload.push_str(&format!("package={}\n", receipt.package));
    payload.push_str(&format!("release={}\n", receipt.release));
    payload.push_str(&format!("patch={}\n", receipt.patch));
    payload.push_str(&format!("archive_url={}\n", receipt.archive_url));
    payload.push_str(&format!("archive_sha256={}\n", receipt.archive_sha256));
    for database in &receipt.databases {
        payload.push_str(&format!(
            "database={}:{}\n",
            database.target, database.source_sha256
        ));
    }
    payload.push_str(&format!(
        "provisioned_at_unix={}\n",
        receipt.provisioned_at_unix
    ));

    let dir = layout.state_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create state dir: {}", dir.display()))?;
    let path = layout.receipt_path();
    fs::write(&path, payload.as_bytes())
        .with_context(|| format!("failed to write provision receipt: {}", path.display()))?;
    Ok(path)
}

pub fn read_provision_receipt(layout: &ProvisionLayout) -> Result<Option<ProvisionReceipt>> {
    let path = layout.receipt_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read provision receipt: {}", path.display()))
        }
    };
    let receipt = parse_receipt(&raw)
        .with_context(|| format!("failed to parse provision receipt: {}", path.display()))?;
    Ok(Some(receipt))
}

pub fn remove_provision_receipt(layout: &ProvisionLayout) -> Result<bool> {
    let path = layout.receipt_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove provision receipt: {}", path.display())),
    }
}

pub(crate) fn parse_receipt(raw: &str) -> Result<ProvisionReceipt> {
    let mut package = None;
    let mut release = None;
    let mut patch = None;
    let mut archive_url = None;
    let mut archive_sha256 = None;
    let mut databases = Vec::new();
    let mut provisioned_at_unix = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k {
            "package" => package = Some(v.to_string()),
            "release" => release = Some(v.to_string()),
            "patch" => patch = Some(v.to_string()),
            "archive_url" => archive_url = Some(v.to_string()),
            "archive_sha256" => archive_sha256 = Some(v.to_string()),
            "database" => {
                let (target, source_sha256) = v
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow!("invalid database entry: {v}"))?;
                databases.push(DatabaseDigest {
                    target: target.to_string(),
                    source_sha256: source_sha256.to_string(),
                });
            }
            "provisioned_at_unix" => {
                provisioned_at_unix =
                    Some(v.parse().context("provisioned_at_unix must be u64")?)
            }
            _ => {}
        }
    }

    Ok(ProvisionReceipt {
        package: package.context("missing package")?,
        release: release.context("missing release")?,
        patch: patch.context("missing patch")?,
        archive_url: archive_url.unwrap_or_default(),
        archive_sha256: archive_sha256.unwrap_or_default(),
        databases,
        provisioned_at_unix: provisioned_at_unix.context("missing provisioned_at_unix")?,
    })
}
