//! Loading of the target repository profile.

use std::path::{Path, PathBuf};

use bindery_types::{ArtifactFormat, RepoProfile};
use bindery_util::expand_tilde;
use tracing::debug;

use crate::codec::decode;
use crate::error::{EngineError, EngineResult};

/// Environment variable that overrides the profile location.
pub const PROFILE_PATH_ENV: &str = "BINDERY_PROFILE_PATH";

/// Profile location relative to the repository root.
pub const DEFAULT_PROFILE_RELPATH: &str = ".aios/target_repo_profile.yaml";

/// Resolve the profile path for a repository.
///
/// `BINDERY_PROFILE_PATH` wins when set (a leading `~` is expanded);
/// otherwise the profile lives at `<repo_root>/.aios/target_repo_profile.yaml`.
pub fn profile_path(repo_root: &Path) -> PathBuf {
    if let Ok(path) = std::env::var(PROFILE_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }
    repo_root.join(DEFAULT_PROFILE_RELPATH)
}

/// Load the repository profile. The file is parsed as JSON when its suffix is
/// `.json` and as YAML otherwise; missing keys take their defaults.
///
/// # Errors
/// * [`EngineError::NotFound`] when the file does not exist
/// * [`EngineError::Configuration`] when it is not a map or has malformed keys
pub fn load_repo_profile(repo_root: &Path) -> EngineResult<RepoProfile> {
    let path = profile_path(repo_root);
    if !path.exists() {
        return Err(EngineError::not_found(format!("repo profile '{}'", path.display())));
    }

    let raw = std::fs::read_to_string(&path).map_err(|error| EngineError::io(&path, error))?;
    let format = match ArtifactFormat::from_path(&path) {
        ArtifactFormat::Json => ArtifactFormat::Json,
        _ => ArtifactFormat::Yaml,
    };
    let document = decode(&raw, format).map_err(|error| EngineError::codec(path.display().to_string(), error))?;
    if !document.is_object() {
        return Err(EngineError::configuration(format!(
            "repo profile '{}' must be a mapping",
            path.display()
        )));
    }

    let profile: RepoProfile = serde_json::from_value(document)
        .map_err(|error| EngineError::configuration(format!("repo profile '{}': {error}", path.display())))?;
    debug!(path = %path.display(), profile_id = %profile.profile_id, "loaded repo profile");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindery_types::RepoKind;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn loads_default_location() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(
            &temp_dir.path().join(DEFAULT_PROFILE_RELPATH),
            "profile_id: demo\nrepo_kind: git_worktree\ncm_catalogue:\n  catalogue_relpath: cm/catalogue.yaml\n",
        );

        let profile = temp_env::with_var_unset(PROFILE_PATH_ENV, || load_repo_profile(temp_dir.path())).unwrap();
        assert_eq!(profile.profile_id, "demo");
        assert_eq!(profile.repo_kind, RepoKind::GitWorktree);
        assert_eq!(profile.cm_catalogue.catalogue_relpath, "cm/catalogue.yaml");
        assert_eq!(profile.cm_catalogue.anchor_field, "cm_id");
    }

    #[test]
    fn env_override_selects_json_profile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let override_path = temp_dir.path().join("elsewhere/profile.json");
        write(&override_path, r#"{"profile_id": "from-env", "cm_catalogue": {"catalogue_relpath": "c.json"}}"#);

        let profile = temp_env::with_var(PROFILE_PATH_ENV, Some(override_path.to_str().unwrap()), || {
            load_repo_profile(temp_dir.path())
        })
        .unwrap();
        assert_eq!(profile.profile_id, "from-env");
    }

    #[test]
    fn missing_and_malformed_profiles() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_env::with_var_unset(PROFILE_PATH_ENV, || load_repo_profile(temp_dir.path()));
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));

        write(&temp_dir.path().join(DEFAULT_PROFILE_RELPATH), "- just\n- a list\n");
        let malformed = temp_env::with_var_unset(PROFILE_PATH_ENV, || load_repo_profile(temp_dir.path()));
        assert!(matches!(malformed, Err(EngineError::Configuration { .. })));
    }
}
