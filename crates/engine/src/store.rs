//! Artifact resolution.
//!
//! An [`ArtifactStore`] turns a logical reference into raw artifact text. Two
//! strategies exist and the set is closed:
//!
//! - [`DirectStore`] treats the reference as a repo-relative path.
//! - [`CatalogueStore`] looks the reference up in a configuration-management
//!   catalogue whose field names come from a caller-supplied
//!   [`CatalogueProfile`], so the catalogue stays the single source of truth
//!   for physical layout.
//!
//! Nothing is cached: every call re-reads the repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bindery_types::{AnchorRef, ArtifactBlob, ArtifactFormat, ArtifactRef, CatalogueProfile};
use bindery_util::{RepoAccess, display_relpath};
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::decode;
use crate::error::{EngineError, EngineResult};

/// Kind reported for anchor loads when neither the entry nor the caller names one.
pub const DEFAULT_ANCHOR_KIND: &str = "cm_anchor";

/// Backing strategy used to resolve artifact references.
#[derive(Clone)]
pub enum ArtifactStore {
    Direct(DirectStore),
    Catalogue(CatalogueStore),
}

impl ArtifactStore {
    /// Resolves a mapping input reference to raw text.
    ///
    /// The direct strategy reads `reference` as a path. The catalogue strategy
    /// tries it as an anchor, then as the id of a `(kind, reference)` entry, and
    /// finally (when enabled) through the file-stem fallback.
    pub fn fetch(&self, reference: &str, kind: &str) -> EngineResult<ArtifactBlob> {
        match self {
            ArtifactStore::Direct(store) => store.resolve(reference, kind),
            ArtifactStore::Catalogue(store) => {
                let catalogue = store.load_catalogue()?;
                let mut anchor = AnchorRef::new(reference);
                if !kind.is_empty() {
                    anchor = anchor.with_expected_kind(kind);
                }
                if let Some(blob) = store.anchor_blob(catalogue.as_ref(), &anchor)? {
                    return Ok(blob);
                }
                store
                    .ref_blob(catalogue.as_ref(), &ArtifactRef::new(kind, reference))?
                    .ok_or_else(|| EngineError::not_found(format!("artifact '{reference}' (kind '{kind}')")))
            }
        }
    }

    /// Loads and decodes an artifact, returning `None` when it does not exist
    /// or does not decode to a map.
    pub fn load_structured(&self, reference: &ArtifactRef) -> EngineResult<Option<Value>> {
        let blob = match self {
            ArtifactStore::Direct(store) => match store.resolve(&reference.id, &reference.kind) {
                Ok(blob) => Some(blob),
                Err(EngineError::NotFound { .. }) => None,
                Err(error) => return Err(error),
            },
            ArtifactStore::Catalogue(store) => store.load_by_ref(reference)?,
        };
        let Some(blob) = blob else {
            return Ok(None);
        };

        let origin = blob.relpath.clone().unwrap_or_else(|| reference.to_string());
        let value = decode(&blob.raw, blob.format).map_err(|error| EngineError::codec(origin, error))?;
        Ok(value.is_object().then_some(value))
    }

    /// Writes raw text to the location registered for `anchor`.
    pub fn save_to_anchor(&self, anchor: &AnchorRef, raw: &str) -> EngineResult<()> {
        match self {
            ArtifactStore::Direct(_) => Err(EngineError::unsupported("operation on direct store", "save_to_anchor")),
            ArtifactStore::Catalogue(store) => store.save_to_anchor(anchor, raw),
        }
    }
}

/// Resolves references as repo-relative paths.
#[derive(Clone)]
pub struct DirectStore {
    repo: Arc<dyn RepoAccess>,
}

impl DirectStore {
    pub fn new(repo: Arc<dyn RepoAccess>) -> Self {
        Self { repo }
    }

    /// Reads the artifact at `reference`; a missing extension means `.yaml`.
    pub fn resolve(&self, reference: &str, kind: &str) -> EngineResult<ArtifactBlob> {
        let mut relpath = PathBuf::from(reference.trim());
        if relpath.extension().is_none() {
            relpath.set_extension(ArtifactFormat::Yaml.as_str());
        }
        if !self.repo.exists(&relpath) {
            return Err(EngineError::not_found(format!(
                "artifact '{}'",
                self.repo.root().join(&relpath).display()
            )));
        }

        debug!(reference, kind, path = %relpath.display(), "resolved artifact by path");
        let raw = self.repo.read_text(&relpath).map_err(|error| EngineError::io(&relpath, error))?;
        Ok(ArtifactBlob {
            reference: ArtifactRef::new(kind, reference),
            raw,
            format: ArtifactFormat::from_path(&relpath),
            relpath: Some(display_relpath(&relpath)),
        })
    }
}

/// One catalogue row, read through the profile's field names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogueEntry {
    pub anchor: Option<String>,
    pub location: Option<String>,
    pub format: Option<String>,
    pub kind: Option<String>,
    pub id: Option<String>,
}

impl CatalogueEntry {
    fn from_value(value: &Value, profile: &CatalogueProfile) -> Option<Self> {
        let fields = value.as_object()?;
        let text = |field: Option<&str>| field.and_then(|name| fields.get(name)).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            anchor: text(Some(profile.anchor_field.as_str())),
            location: text(Some(profile.location_field.as_str())),
            format: text(profile.format_field.as_deref()),
            kind: text(profile.artifact_kind_field.as_deref()),
            id: text(profile.artifact_id_field.as_deref()),
        })
    }

    /// Location, format and identity described by this entry.
    ///
    /// An explicit format field wins when it names a known format; otherwise
    /// the format follows the location's extension. Kind and id fall back to
    /// the given defaults when the entry leaves them empty.
    pub fn resolution(&self, default_kind: &str, default_id: &str) -> EntryResolution {
        let relpath = self.location.clone().filter(|location| !location.is_empty());
        let inferred = relpath.as_deref().map(ArtifactFormat::from_path).unwrap_or(ArtifactFormat::Unknown);
        let format = self
            .format
            .as_deref()
            .and_then(|name| name.parse::<ArtifactFormat>().ok())
            .filter(|format| *format != ArtifactFormat::Unknown)
            .unwrap_or(inferred);

        let kind = self.kind.clone().filter(|kind| !kind.is_empty()).unwrap_or_else(|| default_kind.to_string());
        let id = self.id.clone().filter(|id| !id.is_empty()).unwrap_or_else(|| default_id.to_string());

        EntryResolution {
            relpath,
            format,
            reference: ArtifactRef::new(kind, id),
        }
    }
}

/// Where a catalogue entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryResolution {
    /// Repo-relative location; `None` when the entry has no location.
    pub relpath: Option<String>,
    pub format: ArtifactFormat,
    pub reference: ArtifactRef,
}

/// Decoded catalogue entries, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalogue {
    entries: Vec<CatalogueEntry>,
    by_ref_enabled: bool,
}

impl Catalogue {
    /// Reads the entries list named by the profile. Returns `None` when the
    /// document is not a map or has no such list.
    pub fn from_value(document: &Value, profile: &CatalogueProfile) -> Option<Self> {
        let entries = document.as_object()?.get(&profile.entries_list_key)?.as_array()?;
        Some(Self {
            entries: entries
                .iter()
                .map(|entry| CatalogueEntry::from_value(entry, profile).unwrap_or_default())
                .collect(),
            by_ref_enabled: profile.artifact_kind_field.is_some() && profile.artifact_id_field.is_some(),
        })
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    /// First entry whose anchor equals `anchor_id`.
    pub fn find_by_anchor(&self, anchor_id: &str) -> Option<&CatalogueEntry> {
        self.entries.iter().find(|entry| entry.anchor.as_deref() == Some(anchor_id))
    }

    /// First entry whose kind and id equal the reference. Always `None` when
    /// the profile does not name both fields.
    pub fn find_by_ref(&self, reference: &ArtifactRef) -> Option<&CatalogueEntry> {
        if !self.by_ref_enabled {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.kind.as_deref() == Some(reference.kind.as_str()) && entry.id.as_deref() == Some(reference.id.as_str()))
    }
}

/// Resolves references through the configuration-management catalogue.
#[derive(Clone)]
pub struct CatalogueStore {
    repo: Arc<dyn RepoAccess>,
    profile: CatalogueProfile,
    fallback_glob: bool,
}

impl CatalogueStore {
    pub fn new(repo: Arc<dyn RepoAccess>, profile: CatalogueProfile) -> Self {
        Self {
            repo,
            profile,
            fallback_glob: true,
        }
    }

    /// Enables or disables the file-stem search used when no entry matches.
    pub fn with_fallback_glob(mut self, enabled: bool) -> Self {
        self.fallback_glob = enabled;
        self
    }

    pub fn profile(&self) -> &CatalogueProfile {
        &self.profile
    }

    /// Reads and decodes the catalogue. A missing catalogue, or one that is not
    /// a map with an entries list, is `None`.
    pub fn load_catalogue(&self) -> EngineResult<Option<Catalogue>> {
        let relpath = Path::new(&self.profile.catalogue_relpath);
        if self.profile.catalogue_relpath.trim().is_empty() || !self.repo.exists(relpath) {
            debug!(path = %relpath.display(), "catalogue not present");
            return Ok(None);
        }

        let raw = self.repo.read_text(relpath).map_err(|error| EngineError::io(relpath, error))?;
        let document = decode(&raw, ArtifactFormat::from_path(relpath))
            .map_err(|error| EngineError::codec(self.profile.catalogue_relpath.clone(), error))?;
        Ok(Catalogue::from_value(&document, &self.profile))
    }

    /// Resolution of the entry registered under `anchor_id`, if any.
    pub fn locate(&self, anchor_id: &str) -> EngineResult<Option<EntryResolution>> {
        Ok(self
            .load_catalogue()?
            .as_ref()
            .and_then(|catalogue| catalogue.find_by_anchor(anchor_id))
            .map(|entry| entry.resolution(DEFAULT_ANCHOR_KIND, anchor_id)))
    }

    pub fn load_by_anchor(&self, anchor: &AnchorRef) -> EngineResult<Option<ArtifactBlob>> {
        let catalogue = self.load_catalogue()?;
        self.anchor_blob(catalogue.as_ref(), anchor)
    }

    /// Loads by `(kind, id)`; falls back to the file-stem search only when no
    /// catalogue entry matches.
    pub fn load_by_ref(&self, reference: &ArtifactRef) -> EngineResult<Option<ArtifactBlob>> {
        let catalogue = self.load_catalogue()?;
        self.ref_blob(catalogue.as_ref(), reference)
    }

    /// Writes `raw` to the location registered for `anchor`. The catalogue
    /// itself is never modified; unregistered anchors are rejected.
    pub fn save_to_anchor(&self, anchor: &AnchorRef, raw: &str) -> EngineResult<()> {
        let catalogue = self
            .load_catalogue()?
            .ok_or_else(|| EngineError::not_found(format!("catalogue '{}'", self.profile.catalogue_relpath)))?;
        let entry = catalogue
            .find_by_anchor(&anchor.anchor_id)
            .ok_or_else(|| EngineError::not_found(format!("catalogue anchor '{}'", anchor.anchor_id)))?;
        let location = entry
            .location
            .as_deref()
            .filter(|location| !location.is_empty())
            .ok_or_else(|| EngineError::not_found(format!("location for catalogue anchor '{}'", anchor.anchor_id)))?;

        debug!(anchor = %anchor.anchor_id, location, "saving artifact to registered location");
        self.repo
            .write_text(Path::new(location), raw)
            .map_err(|error| EngineError::io(location, error))
    }

    pub(crate) fn anchor_blob(&self, catalogue: Option<&Catalogue>, anchor: &AnchorRef) -> EngineResult<Option<ArtifactBlob>> {
        let Some(entry) = catalogue.and_then(|catalogue| catalogue.find_by_anchor(&anchor.anchor_id)) else {
            return Ok(None);
        };
        let mut resolution = entry.resolution(DEFAULT_ANCHOR_KIND, &anchor.anchor_id);
        if let Some(kind) = anchor.expected_kind.as_deref().filter(|kind| !kind.is_empty()) {
            resolution.reference.kind = kind.to_string();
        }
        self.read_resolution(resolution)
    }

    pub(crate) fn ref_blob(&self, catalogue: Option<&Catalogue>, reference: &ArtifactRef) -> EngineResult<Option<ArtifactBlob>> {
        if let Some(entry) = catalogue.and_then(|catalogue| catalogue.find_by_ref(reference)) {
            return self.read_resolution(entry.resolution(&reference.kind, &reference.id));
        }
        if self.fallback_glob {
            return self.fallback_glob_load(reference);
        }
        Ok(None)
    }

    fn read_resolution(&self, resolution: EntryResolution) -> EngineResult<Option<ArtifactBlob>> {
        let Some(relpath) = resolution.relpath else {
            return Ok(None);
        };
        let path = Path::new(&relpath);
        if !self.repo.exists(path) {
            debug!(location = %relpath, "registered location does not exist");
            return Ok(None);
        }

        let raw = self.repo.read_text(path).map_err(|error| EngineError::io(path, error))?;
        debug!(reference = %resolution.reference, location = %relpath, "resolved artifact through catalogue");
        Ok(Some(ArtifactBlob {
            reference: resolution.reference,
            raw,
            format: resolution.format,
            relpath: Some(relpath),
        }))
    }

    /// Searches the repository for `<id>.<ext>`. First match wins; several
    /// matches are not reported as ambiguous.
    fn fallback_glob_load(&self, reference: &ArtifactRef) -> EngineResult<Option<ArtifactBlob>> {
        let mut candidates = Vec::new();
        for format in ArtifactFormat::SEARCH_EXTENSIONS {
            let pattern = format!("**/{}.{}", reference.id, format.as_str());
            let matches = self.repo.glob(&pattern).map_err(|error| EngineError::io(pattern.as_str(), error))?;
            candidates.extend(matches);
        }

        let Some(first) = candidates.into_iter().next() else {
            return Ok(None);
        };
        warn!(reference = %reference, path = %first.display(), "artifact resolved by file-stem fallback, register it in the catalogue");
        let raw = self.repo.read_text(&first).map_err(|error| EngineError::io(&first, error))?;
        Ok(Some(ArtifactBlob {
            reference: reference.clone(),
            raw,
            format: ArtifactFormat::from_path(&first),
            relpath: Some(display_relpath(&first)),
        }))
    }
}
