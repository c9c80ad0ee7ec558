//! Target repository profile.
//!
//! The profile describes how a repository lays out its catalogue. Field names
//! are data rather than constants so the same resolver can read catalogues of
//! different shapes.

use serde::{Deserialize, Serialize};

/// Field-name configuration of a configuration-management catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogueProfile {
    /// Repo-relative path of the catalogue document.
    #[serde(default)]
    pub catalogue_relpath: String,
    /// Key of the list holding the entries.
    #[serde(default = "default_entries_list_key")]
    pub entries_list_key: String,
    /// Entry field carrying the stable anchor id.
    #[serde(default = "default_anchor_field", alias = "cm_id_field")]
    pub anchor_field: String,
    /// Entry field carrying the repo-relative location.
    #[serde(default = "default_location_field")]
    pub location_field: String,
    #[serde(default = "default_format_field")]
    pub format_field: Option<String>,
    #[serde(default = "default_artifact_kind_field")]
    pub artifact_kind_field: Option<String>,
    #[serde(default = "default_artifact_id_field")]
    pub artifact_id_field: Option<String>,
}

impl CatalogueProfile {
    pub fn new(catalogue_relpath: impl Into<String>) -> Self {
        Self {
            catalogue_relpath: catalogue_relpath.into(),
            ..Self::default()
        }
    }
}

impl Default for CatalogueProfile {
    fn default() -> Self {
        Self {
            catalogue_relpath: String::new(),
            entries_list_key: default_entries_list_key(),
            anchor_field: default_anchor_field(),
            location_field: default_location_field(),
            format_field: default_format_field(),
            artifact_kind_field: default_artifact_kind_field(),
            artifact_id_field: default_artifact_id_field(),
        }
    }
}

fn default_entries_list_key() -> String {
    "entries".to_string()
}

fn default_anchor_field() -> String {
    "cm_id".to_string()
}

fn default_location_field() -> String {
    "location".to_string()
}

fn default_format_field() -> Option<String> {
    Some("format".to_string())
}

fn default_artifact_kind_field() -> Option<String> {
    Some("artifact_kind".to_string())
}

fn default_artifact_id_field() -> Option<String> {
    Some("artifact_id".to_string())
}

/// Kind of backing repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoKind {
    #[default]
    Filesystem,
    GitWorktree,
    GitBare,
    ObjectStore,
    Other,
}

/// Active profile of the target repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoProfile {
    #[serde(default)]
    pub profile_id: String,
    #[serde(default)]
    pub profile_version: String,
    #[serde(default)]
    pub repo_kind: RepoKind,
    #[serde(default)]
    pub cm_catalogue: CatalogueProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let profile: RepoProfile = serde_yaml::from_str(
            r#"
profile_id: demo
cm_catalogue:
  catalogue_relpath: project/cm/catalogue.yaml
  cm_id_field: anchor
  format_field: null
"#,
        )
        .expect("profile parses");

        assert_eq!(profile.repo_kind, RepoKind::Filesystem);
        assert_eq!(profile.cm_catalogue.anchor_field, "anchor");
        assert_eq!(profile.cm_catalogue.entries_list_key, "entries");
        assert_eq!(profile.cm_catalogue.location_field, "location");
        assert_eq!(profile.cm_catalogue.format_field, None);
        assert_eq!(profile.cm_catalogue.artifact_kind_field.as_deref(), Some("artifact_kind"));
    }
}
