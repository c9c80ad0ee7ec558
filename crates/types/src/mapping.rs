//! Mapping documents consumed by the compilers.
//!
//! Two document shapes live here:
//! - [`MappingSpec`], the prompt mapping: declared inputs, descriptive card
//!   fields and an ordered list of field bindings.
//! - [`MappingBundle`], the task mapping: a map of output field paths to
//!   [`FieldSpec`]s carrying extraction sources and validators.
//!
//! Authored forms keep dispatch keys (`source_type`, `render_mode`, `mode`) as
//! plain strings so that an unknown value is reported by name when the
//! document is turned into its closed, typed counterpart.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::ValidationRule;

/// A dispatch key that names no known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedValue {
    /// What the key selects (for example, `render_mode`).
    pub what: &'static str,
    pub value: String,
}

impl fmt::Display for UnsupportedValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unsupported {}: '{}'", self.what, self.value)
    }
}

impl std::error::Error for UnsupportedValue {}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_required() -> bool {
    true
}

/// Prompt mapping document. Loaded once and read-only during a compilation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingSpec {
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    #[serde(default)]
    pub card: CardDescriptor,
    #[serde(default)]
    pub field_bindings: Vec<FieldBindingDefinition>,
    #[serde(default)]
    pub references: MappingReferences,
    #[serde(default = "empty_object")]
    pub llm_overrides: Value,
    #[serde(default = "empty_object")]
    pub output_overrides: Value,
    #[serde(default = "empty_object")]
    pub tooling_metadata: Value,
    #[serde(default = "empty_object")]
    pub traceability: Value,
    /// Top-level fallbacks for the card's domain and scope.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub target_unit_id: Option<String>,
    #[serde(default)]
    pub target_artifact_kind: Option<String>,
    #[serde(default)]
    pub target_operation: Option<String>,
}

/// Declared input of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecl {
    /// Identifier referenced by bindings; unique within the mapping.
    pub input_id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl InputDecl {
    /// The reference string, treating an empty one as absent.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref().map(str::trim).filter(|reference| !reference.is_empty())
    }
}

/// Identity fields copied into the output card.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingReferences {
    #[serde(default)]
    pub default_llm_profile_ref: Option<String>,
}

/// Authored form of a field binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBindingDefinition {
    /// Output path written by the binding.
    pub target_field: String,
    pub source_type: String,
    #[serde(default)]
    pub literal_value: Option<Value>,
    #[serde(default)]
    pub input_id: Option<String>,
    #[serde(default)]
    pub artifact_path: Option<String>,
    #[serde(default)]
    pub render_mode: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

/// Typed field binding.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBinding {
    pub target_field: String,
    pub source: BindingSource,
}

/// Where a binding's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSource {
    /// A value written verbatim.
    Literal { value: Value },
    /// A rendered extract of a resolved input.
    ArtifactSnippet {
        input_id: String,
        /// Path inside the input; empty selects the whole artifact.
        artifact_path: String,
        render_mode: RenderMode,
        prefix: String,
        suffix: String,
    },
}

impl TryFrom<&FieldBindingDefinition> for FieldBinding {
    type Error = UnsupportedValue;

    fn try_from(definition: &FieldBindingDefinition) -> Result<Self, Self::Error> {
        let source = match definition.source_type.trim() {
            "literal" => BindingSource::Literal {
                value: definition.literal_value.clone().unwrap_or_else(|| Value::String(String::new())),
            },
            "artifact_snippet" => BindingSource::ArtifactSnippet {
                input_id: definition.input_id.clone().unwrap_or_default(),
                artifact_path: definition.artifact_path.clone().unwrap_or_default(),
                render_mode: match definition.render_mode.as_deref() {
                    Some(mode) => mode.parse()?,
                    None => RenderMode::default(),
                },
                prefix: definition.prefix.clone().unwrap_or_default(),
                suffix: definition.suffix.clone().unwrap_or_default(),
            },
            other => {
                return Err(UnsupportedValue {
                    what: "source_type",
                    value: other.to_string(),
                });
            }
        };
        Ok(FieldBinding {
            target_field: definition.target_field.clone(),
            source,
        })
    }
}

/// Serialization style used when embedding a snippet into an output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Block YAML.
    #[default]
    YamlBlock,
    /// The snippet's plain string form.
    Inline,
    /// Currently rendered like [`RenderMode::YamlBlock`].
    Summary,
}

impl FromStr for RenderMode {
    type Err = UnsupportedValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "yaml_block" => Ok(RenderMode::YamlBlock),
            "inline" => Ok(RenderMode::Inline),
            "summary" => Ok(RenderMode::Summary),
            other => Err(UnsupportedValue {
                what: "render_mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Task mapping document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingBundle {
    #[serde(default)]
    pub metadata: BundleMetadata,
    /// Output field specs keyed by body path, in authoring order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

impl Default for BundleMetadata {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
        }
    }
}

fn default_schema_version() -> String {
    "0v1".to_string()
}

/// Declarative description of one output field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub validators: Vec<ValidationRule>,
    /// Allowed values checked by `in_enum` rules.
    #[serde(default, rename = "enum")]
    pub enumeration: Vec<Value>,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
}

/// Extraction instructions for a task field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub sources: Vec<MappingSourceRef>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingSourceRef {
    #[serde(default)]
    pub artifact_kind: Option<String>,
    #[serde(default)]
    pub internal_artifact_path: Option<String>,
}

/// How an extracted value is shaped before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingMode {
    /// Value as extracted.
    #[default]
    Copy,
    /// Always a list; `null` becomes empty, scalars are wrapped.
    CopyList,
    /// Like [`MappingMode::CopyList`], keeping the first occurrence of each value.
    CopyListUnique,
}

impl FromStr for MappingMode {
    type Err = UnsupportedValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "copy" => Ok(MappingMode::Copy),
            "copy_list" => Ok(MappingMode::CopyList),
            "copy_list_unique" => Ok(MappingMode::CopyListUnique),
            other => Err(UnsupportedValue {
                what: "mapping mode",
                value: other.to_string(),
            }),
        }
    }
}

impl FieldMapping {
    /// Parsed mode; absent means [`MappingMode::Copy`].
    pub fn mode(&self) -> Result<MappingMode, UnsupportedValue> {
        match self.mode.as_deref() {
            Some(mode) if !mode.trim().is_empty() => mode.parse(),
            _ => Ok(MappingMode::Copy),
        }
    }
}
