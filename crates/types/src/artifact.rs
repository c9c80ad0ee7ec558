//! Artifact identity and payload types.
//!
//! An artifact is any document tracked by a target repository: structured
//! YAML/JSON or opaque markdown/text. Callers refer to artifacts logically,
//! either by `(kind, id)` or by a catalogue anchor, and receive an
//! [`ArtifactBlob`] once the reference has been resolved to a file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical identity of a referenced document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Artifact kind (for example, `unit_detailed_design`).
    pub kind: String,
    /// Identifier unique within the kind (for example, `UDD-SCHED-01`).
    pub id: String,
}

impl ArtifactRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.kind, self.id)
    }
}

/// Request for an artifact registered in the catalogue under a stable anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorRef {
    /// Anchor identifier as written in the catalogue.
    pub anchor_id: String,
    /// When present, replaces the kind derived from the catalogue entry.
    #[serde(default)]
    pub expected_kind: Option<String>,
}

impl AnchorRef {
    pub fn new(anchor_id: impl Into<String>) -> Self {
        Self {
            anchor_id: anchor_id.into(),
            expected_kind: None,
        }
    }

    pub fn with_expected_kind(mut self, kind: impl Into<String>) -> Self {
        self.expected_kind = Some(kind.into());
        self
    }
}

/// Storage format of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Yaml,
    Yml,
    Json,
    Md,
    Txt,
    Unknown,
}

impl ArtifactFormat {
    /// Extensions probed, in order, when an artifact is searched by file stem.
    pub const SEARCH_EXTENSIONS: [ArtifactFormat; 5] = [
        ArtifactFormat::Yaml,
        ArtifactFormat::Yml,
        ArtifactFormat::Json,
        ArtifactFormat::Md,
        ArtifactFormat::Txt,
    ];

    /// Canonical lowercase name, also used as the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactFormat::Yaml => "yaml",
            ArtifactFormat::Yml => "yml",
            ArtifactFormat::Json => "json",
            ArtifactFormat::Md => "md",
            ArtifactFormat::Txt => "txt",
            ArtifactFormat::Unknown => "unknown",
        }
    }

    /// Maps a file extension (with or without the leading dot) to a format.
    pub fn from_extension(extension: &str) -> Self {
        let normalized = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "yaml" => ArtifactFormat::Yaml,
            "yml" => ArtifactFormat::Yml,
            "json" => ArtifactFormat::Json,
            "md" => ArtifactFormat::Md,
            "txt" => ArtifactFormat::Txt,
            _ => ArtifactFormat::Unknown,
        }
    }

    /// Infers the format from a path's suffix; paths without one are `Unknown`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|extension| extension.to_str())
            .map(ArtifactFormat::from_extension)
            .unwrap_or(ArtifactFormat::Unknown)
    }

    /// True for the formats that decode into maps/lists rather than opaque text.
    pub fn is_structured(self) -> bool {
        matches!(self, ArtifactFormat::Yaml | ArtifactFormat::Yml | ArtifactFormat::Json)
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFormat {
    type Err = String;

    /// Strict parse: only the known format names are accepted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match ArtifactFormat::from_extension(value) {
            ArtifactFormat::Unknown if !value.trim().eq_ignore_ascii_case("unknown") => Err(format!("unknown artifact format '{value}'")),
            format => Ok(format),
        }
    }
}

/// Raw content of a resolved artifact. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBlob {
    /// Identity reported by the resolution (may differ from the request when
    /// the catalogue entry names its own kind/id).
    pub reference: ArtifactRef,
    /// Text exactly as read from the repository.
    pub raw: String,
    pub format: ArtifactFormat,
    /// Repo-relative location the text was read from.
    pub relpath: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_format_from_extension_case_insensitively() {
        assert_eq!(ArtifactFormat::from_path("design/udd.YAML"), ArtifactFormat::Yaml);
        assert_eq!(ArtifactFormat::from_path("notes/readme.md"), ArtifactFormat::Md);
        assert_eq!(ArtifactFormat::from_path("catalogue"), ArtifactFormat::Unknown);
        assert_eq!(ArtifactFormat::from_path("archive.tar.gz"), ArtifactFormat::Unknown);
    }

    #[test]
    fn strict_parse_rejects_unrecognised_names() {
        assert_eq!("JSON".parse::<ArtifactFormat>(), Ok(ArtifactFormat::Json));
        assert_eq!("unknown".parse::<ArtifactFormat>(), Ok(ArtifactFormat::Unknown));
        assert!("toml".parse::<ArtifactFormat>().is_err());
    }

    #[test]
    fn artifact_ref_displays_as_kind_and_id() {
        assert_eq!(ArtifactRef::new("udd", "UDD-01").to_string(), "udd:UDD-01");
    }
}
