//! # Task Compiler
//!
//! Builds a task document from a task order, a mapping bundle and the
//! artifacts the bundle's field mappings read from.
//!
//! Extraction and validation problems do not abort the compilation. They are
//! collected as readable messages next to the (possibly incomplete) task so
//! that callers can decide whether to proceed.

use bindery_types::{ArtifactRef, MappingBundle, MappingMode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::path::{get_path, set_path};
use crate::store::ArtifactStore;
use crate::validator::validate_fields;

/// Artifact kind under which the task order's unit design is loaded.
pub const UNIT_DESIGN_KIND: &str = "unit_detailed_design";

const ID_LIST_SUFFIX: &str = "[].id";

/// Result of [`TaskCompiler::compile_task`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCompilation {
    pub task: Value,
    /// Extraction and validation messages, in the order they were found.
    pub errors: Vec<String>,
}

/// Compiles task orders against one mapping bundle.
#[derive(Clone)]
pub struct TaskCompiler {
    store: ArtifactStore,
    mapping_bundle_ref: ArtifactRef,
    project_ref: Option<ArtifactRef>,
}

impl TaskCompiler {
    pub fn new(store: ArtifactStore, mapping_bundle_ref: ArtifactRef) -> Self {
        Self {
            store,
            mapping_bundle_ref,
            project_ref: None,
        }
    }

    /// Makes the referenced project available to mappings as `project`.
    pub fn with_project(mut self, project_ref: ArtifactRef) -> Self {
        self.project_ref = Some(project_ref);
        self
    }

    /// Compiles a task order.
    ///
    /// # Errors
    /// Store and decode failures, an unparseable mapping bundle, an unknown
    /// mapping mode, and path conflicts while writing the body.
    pub fn compile_task(&self, task_order: &Value) -> EngineResult<TaskCompilation> {
        let bundle = self.load_bundle()?;

        let unit_id = match task_order.get("unit_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Ok(TaskCompilation {
                    task: json!({}),
                    errors: vec!["task_order.unit_id missing".to_string()],
                });
            }
        };

        let mut context = Map::new();
        context.insert("task_order".to_string(), task_order.clone());
        let unit = self.load_or_empty(&ArtifactRef::new(UNIT_DESIGN_KIND, &unit_id))?;
        context.insert(UNIT_DESIGN_KIND.to_string(), unit);
        if let Some(project_ref) = &self.project_ref {
            context.insert("project".to_string(), self.load_or_empty(project_ref)?);
        }

        let mut errors = Vec::new();
        let mut body = json!({});
        for (field, spec) in &bundle.fields {
            let Some(mapping) = &spec.mapping else {
                continue;
            };
            let Some(source) = mapping.sources.first() else {
                continue;
            };
            let Some(kind) = source.artifact_kind.as_deref().filter(|kind| !kind.is_empty()) else {
                continue;
            };
            let Some(artifact) = context.get(kind) else {
                errors.push(format!("{field}: missing context for artifact_kind='{kind}'"));
                continue;
            };

            let internal_path = source.internal_artifact_path.as_deref().unwrap_or_default();
            let extracted = get_path(artifact, internal_path).unwrap_or(Value::Null);
            let value = apply_mode(mapping.mode()?, extracted);
            debug!(field = %field, kind, "mapped task field");
            write_field(&mut body, field, value)?;
        }

        let validation = validate_fields(&bundle.fields, &body);
        errors.extend(validation.issues.iter().map(ToString::to_string));

        info!(unit_id = %unit_id, errors = errors.len(), "compiled task");
        Ok(TaskCompilation {
            task: json!({
                "metadata": {"schema_version": bundle.metadata.schema_version},
                "body": body,
            }),
            errors,
        })
    }

    fn load_bundle(&self) -> EngineResult<MappingBundle> {
        let Some(document) = self.store.load_structured(&self.mapping_bundle_ref)? else {
            debug!(bundle = %self.mapping_bundle_ref, "mapping bundle not found, using an empty bundle");
            return Ok(MappingBundle::default());
        };
        serde_json::from_value(document)
            .map_err(|error| EngineError::configuration(format!("invalid mapping bundle '{}': {error}", self.mapping_bundle_ref)))
    }

    fn load_or_empty(&self, reference: &ArtifactRef) -> EngineResult<Value> {
        Ok(self.store.load_structured(reference)?.unwrap_or_else(|| json!({})))
    }
}

/// Shapes an extracted value according to `mode`.
pub fn apply_mode(mode: MappingMode, extracted: Value) -> Value {
    match (mode, extracted) {
        (MappingMode::Copy, value) => value,
        (_, Value::Null) => Value::Array(Vec::new()),
        (MappingMode::CopyList, Value::Array(items)) => Value::Array(items),
        (MappingMode::CopyListUnique, Value::Array(items)) => {
            let mut unique: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique.contains(&item) {
                    unique.push(item);
                }
            }
            Value::Array(unique)
        }
        (_, value) => Value::Array(vec![value]),
    }
}

/// Writes a mapped value into the task body.
///
/// A `<list>[].id` target given a list becomes `<list>: [{id: v}, ...]`.
fn write_field(body: &mut Value, field: &str, value: Value) -> EngineResult<()> {
    if let Some(list_path) = field.strip_suffix(".id").filter(|_| field.ends_with(ID_LIST_SUFFIX))
        && let Value::Array(ids) = value
    {
        let records = ids.into_iter().map(|id| json!({"id": id})).collect();
        set_path(body, list_path, Value::Array(records), false)?;
        return Ok(());
    }
    set_path(body, field, value, false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_list_wraps_and_defaults_to_empty() {
        assert_eq!(apply_mode(MappingMode::CopyList, Value::Null), json!([]));
        assert_eq!(apply_mode(MappingMode::CopyList, json!("a")), json!(["a"]));
        assert_eq!(apply_mode(MappingMode::CopyList, json!(["a", "a"])), json!(["a", "a"]));
        assert_eq!(apply_mode(MappingMode::Copy, Value::Null), Value::Null);
    }

    #[test]
    fn copy_list_unique_keeps_first_occurrence() {
        let value = apply_mode(MappingMode::CopyListUnique, json!(["b", "a", "b", {"k": 1}, {"k": 1}]));
        assert_eq!(value, json!(["b", "a", {"k": 1}]));
    }

    #[test]
    fn copy_list_unique_ignores_key_order() {
        let first = serde_json::from_str::<Value>(r#"{"id": "U-1", "role": "owner"}"#).unwrap();
        let reordered = serde_json::from_str::<Value>(r#"{"role": "owner", "id": "U-1"}"#).unwrap();
        let value = apply_mode(MappingMode::CopyListUnique, Value::Array(vec![first.clone(), reordered]));
        assert_eq!(value, Value::Array(vec![first]));
    }

    #[test]
    fn id_list_targets_become_records() {
        let mut body = json!({});
        write_field(&mut body, "task.dependencies[].id", json!(["U-1", "U-2"])).unwrap();
        assert_eq!(body, json!({"task": {"dependencies": [{"id": "U-1"}, {"id": "U-2"}]}}));

        let mut body = json!({});
        write_field(&mut body, "owners[].id", json!("solo")).unwrap();
        assert_eq!(body, json!({"owners": [{"id": "solo"}]}));
    }
}
