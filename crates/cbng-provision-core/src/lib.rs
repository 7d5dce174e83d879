mod archive;
mod config;
mod error;
mod version;

pub use archive::ArchiveType;
pub use config::{
    DatabasePair, DatabasesSection, LayoutSection, PackageSection, PathsSection,
    ProvisionConfig, RebuildPolicy, DEFAULT_URL_TEMPLATE,
};
pub use error::ProvisionError;
pub use version::PinnedVersion;

#[cfg(test)]
mod tests;
