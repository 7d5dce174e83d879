use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveType {
    #[serde(rename = "deb")]
    Deb,
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.xz")]
    TarXz,
    #[serde(rename = "tar.zst")]
    TarZst,
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::TarZst => "tar.zst",
            Self::Zip => "zip",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "deb" => Some(Self::Deb),
            "tar.gz" | "tgz" => Some(Self::TarGz),
            "tar.xz" | "txz" => Some(Self::TarXz),
            "tar.zst" | "tzst" => Some(Self::TarZst),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn infer_from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        let without_fragment = lower.split('#').next().unwrap_or(&lower);
        let path = without_fragment
            .split('?')
            .next()
            .unwrap_or(without_fragment);

        if path.ends_with(".deb") {
            return Some(Self::Deb);
        }
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            return Some(Self::TarXz);
        }
        if path.ends_with(".tar.zst") || path.ends_with(".tzst") {
            return Some(Self::TarZst);
        }
        if path.ends_with(".zip") {
            return Some(Self::Zip);
        }

        None
    }
}
