//! Shared type definitions for the Bindery workspace.
//!
//! The models mirror the authored documents (prompt mappings, task mapping
//! bundles, repo profiles, catalogues) and preserve authoring order so that
//! compiled output follows the order a document was written in.

pub mod artifact;
pub mod mapping;
pub mod profile;
pub mod validation;

pub use artifact::{AnchorRef, ArtifactBlob, ArtifactFormat, ArtifactRef};
pub use mapping::{
    BindingSource, BundleMetadata, CardDescriptor, FieldBinding, FieldBindingDefinition, FieldMapping, FieldSpec, InputDecl, MappingBundle,
    MappingMode, MappingReferences, MappingSourceRef, MappingSpec, RenderMode, UnsupportedValue,
};
pub use profile::{CatalogueProfile, RepoKind, RepoProfile};
pub use validation::{RuleKind, RuleParams, ValidationIssue, ValidationResult, ValidationRule};
