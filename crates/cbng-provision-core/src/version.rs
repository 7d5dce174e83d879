use std::fmt;

use anyhow::{anyhow, Context, Result};
use semver::Version;

/// A `(release, patch)` pair naming exactly one upstream archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedVersion {
    pub release: Version,
    pub patch: String,
}

impl PinnedVersion {
    pub fn new(release: &str, patch: &str) -> Result<Self> {
        let release = Version::parse(release.trim())
            .with_context(|| format!("release '{release}' is not a valid semantic version"))?;
        validate_patch(patch)?;
        Ok(Self {
            release,
            patch: patch.trim().to_string(),
        })
    }

    /// Substitutes `{release}` and `{patch}` in a URL or path template.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{release}", &self.release.to_string())
            .replace("{patch}", &self.patch)
    }
}

impl fmt::Display for PinnedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.release, self.patch)
    }
}

fn validate_patch(patch: &str) -> Result<()> {
    let trimmed = patch.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("patch must not be empty"));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '+' | '~')))
    {
        return Err(anyhow!(
            "patch '{trimmed}' contains invalid character '{bad}'"
        ));
    }
    Ok(())
}
