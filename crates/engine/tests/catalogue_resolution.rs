use std::path::Path;
use std::sync::Arc;

use bindery_engine::{ArtifactStore, CatalogueStore, EngineError};
use bindery_types::{AnchorRef, ArtifactFormat, ArtifactRef, CatalogueProfile};
use bindery_util::{FsRepoAccess, RepoAccess};
use serde_json::json;

fn repo_with_catalogue() -> (tempfile::TempDir, Arc<dyn RepoAccess>) {
    let temp_dir = tempfile::tempdir().expect("create temp repo");
    let repo: Arc<dyn RepoAccess> = Arc::new(FsRepoAccess::new(temp_dir.path()));
    repo.write_text(Path::new("cm/catalogue.yaml"), include_str!("data/catalogue.yaml"))
        .expect("write catalogue");
    repo.write_text(Path::new("design/U-017.yaml"), include_str!("data/unit_detailed_design.yaml"))
        .expect("write design");
    repo.write_text(Path::new("project/project.json"), r#"{"name": "Sensor hub", "id": "P-1"}"#)
        .expect("write project");
    (temp_dir, repo)
}

fn catalogue_store(repo: &Arc<dyn RepoAccess>) -> CatalogueStore {
    CatalogueStore::new(Arc::clone(repo), CatalogueProfile::new("cm/catalogue.yaml"))
}

#[test]
fn locates_registered_anchors() {
    let temp_dir = tempfile::tempdir().expect("create temp repo");
    let repo: Arc<dyn RepoAccess> = Arc::new(FsRepoAccess::new(temp_dir.path()));
    repo.write_text(
        Path::new("cm/catalogue.yaml"),
        "entries:\n  - {cm_id: A, location: p/a.yaml}\n  - {cm_id: B, location: p/b.yaml}\n",
    )
    .expect("write catalogue");
    let store = catalogue_store(&repo);

    let located = store.locate("B").expect("locate B").expect("B is registered");
    assert_eq!(located.relpath.as_deref(), Some("p/b.yaml"));
    assert_eq!(located.format, ArtifactFormat::Yaml);
    assert!(store.locate("Z").expect("locate Z").is_none());
}

#[test]
fn missing_catalogue_resolves_nothing() {
    let temp_dir = tempfile::tempdir().expect("create temp repo");
    let repo: Arc<dyn RepoAccess> = Arc::new(FsRepoAccess::new(temp_dir.path()));
    let store = catalogue_store(&repo).with_fallback_glob(false);

    assert!(store.load_catalogue().expect("load").is_none());
    assert!(store.load_by_anchor(&AnchorRef::new("CM-UDD-017")).expect("load").is_none());
    let error = store.save_to_anchor(&AnchorRef::new("CM-OUT"), "x").unwrap_err();
    assert!(matches!(error, EngineError::NotFound { .. }));
}

#[test]
fn loads_by_reference_with_entry_format() {
    let (_temp_dir, repo) = repo_with_catalogue();
    let store = catalogue_store(&repo);

    let blob = store
        .load_by_ref(&ArtifactRef::new("project", "P-1"))
        .expect("load project")
        .expect("project is registered");
    assert_eq!(blob.format, ArtifactFormat::Json);
    assert_eq!(blob.relpath.as_deref(), Some("project/project.json"));

    let project = ArtifactStore::Catalogue(store)
        .load_structured(&ArtifactRef::new("project", "P-1"))
        .expect("load structured");
    assert_eq!(project, Some(json!({"name": "Sensor hub", "id": "P-1"})));
}

#[test]
fn fetch_tries_anchor_then_reference() {
    let (_temp_dir, repo) = repo_with_catalogue();
    let store = ArtifactStore::Catalogue(catalogue_store(&repo));

    let by_anchor = store.fetch("CM-UDD-017", "unit_detailed_design").expect("fetch by anchor");
    let by_ref = store.fetch("U-017", "unit_detailed_design").expect("fetch by reference");
    assert_eq!(by_anchor.raw, by_ref.raw);
    assert_eq!(by_ref.reference, ArtifactRef::new("unit_detailed_design", "U-017"));

    let error = store.fetch("U-999", "unit_detailed_design").unwrap_err();
    assert!(matches!(error, EngineError::NotFound { .. }));
}

#[test]
fn unregistered_artifacts_fall_back_to_file_stem() {
    let (_temp_dir, repo) = repo_with_catalogue();
    repo.write_text(Path::new("loose/notes/U-042.md"), "# Notes\n").expect("write loose file");

    let store = ArtifactStore::Catalogue(catalogue_store(&repo));
    let blob = store.fetch("U-042", "notes").expect("fallback fetch");
    assert_eq!(blob.format, ArtifactFormat::Md);
    assert_eq!(blob.raw, "# Notes\n");

    assert_eq!(store.load_structured(&ArtifactRef::new("notes", "U-042")).expect("load"), None);

    let strict = ArtifactStore::Catalogue(catalogue_store(&repo).with_fallback_glob(false));
    assert!(matches!(strict.fetch("U-042", "notes"), Err(EngineError::NotFound { .. })));
}

#[test]
fn malformed_catalogue_is_a_decode_error() {
    let temp_dir = tempfile::tempdir().expect("create temp repo");
    let repo: Arc<dyn RepoAccess> = Arc::new(FsRepoAccess::new(temp_dir.path()));
    repo.write_text(Path::new("cm/catalogue.yaml"), "entries: [unclosed\n").expect("write catalogue");

    let error = catalogue_store(&repo).locate("A").unwrap_err();
    assert!(matches!(error, EngineError::Codec { .. }));
}
