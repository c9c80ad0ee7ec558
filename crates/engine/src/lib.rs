//! # Bindery Engine
//!
//! Resolves references to structured artifacts, extracts values from them with
//! a small path language, binds those values into fixed-shape output documents
//! and validates the result against field-level rules.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bindery_engine::{ArtifactStore, CompileOptions, DirectStore, compile_prompt_request, load_mapping_spec};
//! use bindery_util::FsRepoAccess;
//!
//! let temp_dir = tempfile::tempdir()?;
//! std::fs::write(temp_dir.path().join("udd.yaml"), "summary: Reads the sensor bus.\n")?;
//! let mapping_path = temp_dir.path().join("mapping.yaml");
//! std::fs::write(&mapping_path, r#"
//! card: {id: PR.DEMO}
//! inputs:
//!   - {input_id: udd, kind: unit_detailed_design, ref: udd}
//! field_bindings:
//!   - target_field: prompt_template.user_prompt
//!     source_type: artifact_snippet
//!     input_id: udd
//!     artifact_path: summary
//!     render_mode: inline
//! "#)?;
//!
//! let mapping = load_mapping_spec(&mapping_path)?;
//! let store = ArtifactStore::Direct(DirectStore::new(Arc::new(FsRepoAccess::new(temp_dir.path()))));
//! let request = compile_prompt_request(&mapping, &store, &CompileOptions::default())?;
//! assert_eq!(request["rendered_prompt"]["user_prompt"], "Reads the sensor bus.");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`path`**: dotted path expressions with list selectors
//! - **`codec`**: YAML/JSON/text decoding and encoding
//! - **`store`**: direct and catalogue-backed artifact resolution
//! - **`compiler`**: prompt request compilation from a prompt mapping
//! - **`task`**: task compilation from a mapping bundle
//! - **`validator`**: field-level rule checks
//! - **`profile`**: target repository profile loading

use std::path::Path;

use bindery_types::{ArtifactFormat, MappingBundle, MappingSpec};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod codec;
pub mod compiler;
pub mod error;
pub mod path;
pub mod profile;
pub mod store;
pub mod task;
pub mod validator;

pub use codec::{CodecError, decode, decode_blob, encode, to_yaml_block, value_to_text};
pub use compiler::{CompileOptions, compile_prompt_request, render_snippet};
pub use error::{EngineError, EngineResult};
pub use path::{MAX_WRITE_INDEX, PathError, PathExpression, get_path, set_path};
pub use profile::{PROFILE_PATH_ENV, load_repo_profile, profile_path};
pub use store::{ArtifactStore, Catalogue, CatalogueEntry, CatalogueStore, DirectStore, EntryResolution};
pub use task::{TaskCompilation, TaskCompiler, apply_mode};
pub use validator::validate_fields;

/// Reads and decodes a structured document from disk. The format follows the
/// file extension; files without a known extension are sniffed like
/// [`ArtifactFormat::Unknown`].
///
/// # Errors
/// [`EngineError::Io`] when the file cannot be read and
/// [`EngineError::Codec`] when it does not parse.
pub fn load_document(file_path: impl AsRef<Path>) -> EngineResult<Value> {
    let file_path = file_path.as_ref();
    let raw = std::fs::read_to_string(file_path).map_err(|error| EngineError::io(file_path, error))?;
    decode(&raw, ArtifactFormat::from_path(file_path)).map_err(|error| EngineError::codec(file_path.display().to_string(), error))
}

/// Loads a prompt mapping document.
pub fn load_mapping_spec(file_path: impl AsRef<Path>) -> EngineResult<MappingSpec> {
    load_typed(file_path.as_ref(), "prompt mapping")
}

/// Loads a task mapping bundle.
pub fn load_mapping_bundle(file_path: impl AsRef<Path>) -> EngineResult<MappingBundle> {
    load_typed(file_path.as_ref(), "mapping bundle")
}

fn load_typed<T: DeserializeOwned>(file_path: &Path, what: &str) -> EngineResult<T> {
    let document = load_document(file_path)?;
    if !document.is_object() {
        return Err(EngineError::configuration(format!("{what} '{}' must be a mapping", file_path.display())));
    }
    serde_json::from_value(document)
        .map_err(|error| EngineError::configuration(format!("invalid {what} '{}': {error}", file_path.display())))
}
