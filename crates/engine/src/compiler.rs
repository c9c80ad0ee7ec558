//! # Prompt Compiler
//!
//! Turns a [`MappingSpec`] into a `prompt_request` document.
//!
//! ## Pipeline
//!
//! 1. **Prepare**: authored bindings become typed [`FieldBinding`]s and the
//!    input declarations are checked against them.
//! 2. **Resolve**: every declared input is taken from the overrides, fetched
//!    through the [`ArtifactStore`], or left `null` when optional.
//! 3. **Seed**: the fixed-shape skeleton is filled from the mapping's card and
//!    pass-through sections.
//! 4. **Bind**: bindings are applied in declaration order. Several bindings on
//!    the same target accumulate, separated by a blank line.
//! 5. **Finalize**: template prompts are copied into `rendered_prompt`.
//!
//! Any failure aborts the compilation; a partial document is never returned.

use std::collections::HashSet;

use bindery_types::{BindingSource, FieldBinding, InputDecl, MappingSpec, RenderMode};
use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::codec::{decode_blob, to_yaml_block, value_to_text};
use crate::error::{EngineError, EngineResult};
use crate::path::{get_path, set_path};
use crate::store::ArtifactStore;

/// Card id used when the mapping does not name one.
pub const DEFAULT_CARD_ID: &str = "PR.UNNAMED";
/// Card name used when the mapping does not name one.
pub const DEFAULT_CARD_NAME: &str = "Prompt request from prompt_mapping";

/// Per-call knobs of [`compile_prompt_request`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Pre-resolved inputs by `input_id`. An overridden input never touches the store.
    pub input_overrides: IndexMap<String, Value>,
    /// Appended to the card id, typically to make it unique per invocation.
    pub card_id_suffix: String,
}

impl CompileOptions {
    pub fn with_override(mut self, input_id: impl Into<String>, value: Value) -> Self {
        self.input_overrides.insert(input_id.into(), value);
        self
    }

    pub fn with_card_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.card_id_suffix = suffix.into();
        self
    }
}

/// Compiles a prompt mapping into a prompt request document.
///
/// # Arguments
/// * `mapping` - The prompt mapping; read-only.
/// * `store` - Store used for inputs that are not overridden.
/// * `options` - Input overrides and card id suffix.
///
/// # Errors
/// * [`EngineError::Unsupported`] for an unknown `source_type` or `render_mode`
/// * [`EngineError::Configuration`] for duplicate or undeclared input ids
/// * [`EngineError::MissingInput`] when a required input cannot be resolved
/// * [`EngineError::NotFound`] or [`EngineError::Codec`] from the store
/// * [`EngineError::Structural`] when a target path conflicts with the skeleton
pub fn compile_prompt_request(mapping: &MappingSpec, store: &ArtifactStore, options: &CompileOptions) -> EngineResult<Value> {
    let bindings = prepare_bindings(mapping)?;
    let resolved = resolve_inputs(&mapping.inputs, store, &options.input_overrides)?;

    let mut request = seed_skeleton(mapping, &options.card_id_suffix);
    for binding in &bindings {
        let value = binding_value(binding, &resolved)?;
        debug!(target_field = %binding.target_field, "applying binding");
        set_path(&mut request, &binding.target_field, value, true)?;
    }
    finalize(&mut request)?;

    info!(
        card_id = %request["card"]["id"].as_str().unwrap_or_default(),
        inputs = resolved.len(),
        bindings = bindings.len(),
        "compiled prompt request"
    );
    Ok(request)
}

/// Converts authored bindings into their typed form and checks that every
/// input they name is declared exactly once.
pub fn prepare_bindings(mapping: &MappingSpec) -> EngineResult<Vec<FieldBinding>> {
    let mut declared = HashSet::new();
    for input in &mapping.inputs {
        if !declared.insert(input.input_id.as_str()) {
            return Err(EngineError::configuration(format!("duplicate input_id '{}'", input.input_id)));
        }
    }

    let mut bindings = Vec::with_capacity(mapping.field_bindings.len());
    for definition in &mapping.field_bindings {
        let binding = FieldBinding::try_from(definition)?;
        if let BindingSource::ArtifactSnippet { input_id, .. } = &binding.source
            && !declared.contains(input_id.as_str())
        {
            return Err(EngineError::configuration(format!(
                "binding for '{}' references undeclared input '{input_id}'",
                binding.target_field
            )));
        }
        bindings.push(binding);
    }
    Ok(bindings)
}

/// Resolves declared inputs in declaration order.
///
/// Overrides are deep-copied and win over the declared reference. An input
/// with neither is `null` when optional and a [`EngineError::MissingInput`]
/// when required.
pub fn resolve_inputs(
    inputs: &[InputDecl],
    store: &ArtifactStore,
    overrides: &IndexMap<String, Value>,
) -> EngineResult<IndexMap<String, Value>> {
    let mut resolved = IndexMap::with_capacity(inputs.len());
    for input in inputs {
        if let Some(value) = overrides.get(&input.input_id) {
            debug!(input_id = %input.input_id, "input taken from override");
            resolved.insert(input.input_id.clone(), value.clone());
            continue;
        }

        let value = match input.reference() {
            Some(reference) => {
                let blob = store.fetch(reference, &input.kind)?;
                let origin = blob.relpath.clone().unwrap_or_else(|| reference.to_string());
                debug!(input_id = %input.input_id, %origin, "input resolved through store");
                decode_blob(&blob).map_err(|error| EngineError::codec(origin, error))?
            }
            None if input.required => {
                return Err(EngineError::missing_input(&input.input_id, "required but has no ref and no override"));
            }
            None => Value::Null,
        };
        resolved.insert(input.input_id.clone(), value);
    }
    Ok(resolved)
}

fn seed_skeleton(mapping: &MappingSpec, card_id_suffix: &str) -> Value {
    let card = &mapping.card;
    let card_id = card.id.as_deref().filter(|id| !id.is_empty()).unwrap_or(DEFAULT_CARD_ID);
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    json!({
        "artifact_kind": "prompt_request",
        "schema_version": "0.1",
        "card": {
            "id": format!("{card_id}{card_id_suffix}"),
            "name": card.name.clone().unwrap_or_else(|| DEFAULT_CARD_NAME.to_string()),
            "domain": card.domain.clone().or_else(|| mapping.domain.clone()).unwrap_or_else(|| "meta".to_string()),
            "scope": card.scope.clone().or_else(|| mapping.scope.clone()).unwrap_or_default(),
            "target_unit_id": text(&mapping.target_unit_id),
            "target_artifact_kind": text(&mapping.target_artifact_kind),
            "target_operation": text(&mapping.target_operation),
        },
        "system_context": {
            "description": "",
            "links": [],
            "assumptions": [],
        },
        "project_context": {
            "name": "",
            "domain": "",
            "id": "",
            "notes": "",
        },
        "task_context": {
            "name": "",
            "goal": "",
            "kind": "",
            "acceptance_criteria": [],
            "constraints": [],
            "notes": "",
        },
        "input_artifacts": [],
        "prompt_template": {
            "system_prompt": "",
            "user_prompt": "",
            "assistant_instructions": "",
            "few_shot": [],
        },
        "llm_profile_ref": text(&mapping.references.default_llm_profile_ref),
        "llm_overrides": mapping.llm_overrides.clone(),
        "output_constraints": mapping.output_overrides.clone(),
        "rendered_prompt": {
            "system_prompt": "",
            "user_prompt": "",
        },
        "tooling_metadata": mapping.tooling_metadata.clone(),
        "traceability": mapping.traceability.clone(),
    })
}

fn binding_value(binding: &FieldBinding, resolved: &IndexMap<String, Value>) -> EngineResult<Value> {
    match &binding.source {
        BindingSource::Literal { value } => Ok(value.clone()),
        BindingSource::ArtifactSnippet {
            input_id,
            artifact_path,
            render_mode,
            prefix,
            suffix,
        } => {
            let artifact = resolved
                .get(input_id)
                .filter(|artifact| !artifact.is_null())
                .ok_or_else(|| EngineError::missing_input(input_id, "artifact_snippet binding requires a resolved input"))?;
            let rendered = render_snippet(artifact, artifact_path, *render_mode, prefix, suffix)?;
            Ok(Value::String(rendered))
        }
    }
}

/// Renders the part of `artifact` at `artifact_path` as prompt text.
///
/// An empty path selects the whole artifact and a missing one renders `null`.
/// `prefix` and `suffix`, when non-empty, go on their own lines around the
/// body; trailing newlines are trimmed from the result.
pub fn render_snippet(
    artifact: &Value,
    artifact_path: &str,
    render_mode: RenderMode,
    prefix: &str,
    suffix: &str,
) -> EngineResult<String> {
    let snippet = if artifact_path.is_empty() {
        artifact.clone()
    } else {
        get_path(artifact, artifact_path).unwrap_or(Value::Null)
    };

    let body = match render_mode {
        RenderMode::YamlBlock | RenderMode::Summary => {
            to_yaml_block(&snippet).map_err(|error| EngineError::codec(format!("snippet '{artifact_path}'"), error))?
        }
        RenderMode::Inline => value_to_text(&snippet),
    };

    let mut rendered = String::new();
    if !prefix.is_empty() {
        rendered.push_str(prefix.trim_end());
        rendered.push('\n');
    }
    rendered.push_str(body.trim_end());
    rendered.push('\n');
    if !suffix.is_empty() {
        rendered.push_str(suffix.trim());
        rendered.push('\n');
    }
    Ok(rendered.trim_end().to_string())
}

fn finalize(request: &mut Value) -> EngineResult<()> {
    for key in ["system_prompt", "user_prompt"] {
        let text = get_path(request, &format!("prompt_template.{key}")).unwrap_or(Value::Null);
        set_path(request, &format!("rendered_prompt.{key}"), text, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bindery_types::FieldBindingDefinition;
    use bindery_util::FsRepoAccess;

    use crate::store::DirectStore;

    fn empty_store() -> (tempfile::TempDir, ArtifactStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::Direct(DirectStore::new(Arc::new(FsRepoAccess::new(temp_dir.path()))));
        (temp_dir, store)
    }

    fn input(input_id: &str, reference: Option<&str>, required: bool) -> InputDecl {
        InputDecl {
            input_id: input_id.into(),
            kind: "unit_detailed_design".into(),
            reference: reference.map(str::to_string),
            required,
        }
    }

    fn literal(target: &str, value: Value) -> FieldBindingDefinition {
        FieldBindingDefinition {
            target_field: target.into(),
            source_type: "literal".into(),
            literal_value: Some(value),
            input_id: None,
            artifact_path: None,
            render_mode: None,
            prefix: None,
            suffix: None,
        }
    }

    fn snippet(target: &str, input_id: &str, path: &str) -> FieldBindingDefinition {
        FieldBindingDefinition {
            target_field: target.into(),
            source_type: "artifact_snippet".into(),
            literal_value: None,
            input_id: Some(input_id.into()),
            artifact_path: Some(path.into()),
            render_mode: None,
            prefix: None,
            suffix: None,
        }
    }

    #[test]
    fn skeleton_uses_defaults_and_fallbacks() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            domain: Some("firmware".into()),
            ..MappingSpec::default()
        };
        let options = CompileOptions::default().with_card_id_suffix(".run-1");

        let request = compile_prompt_request(&mapping, &store, &options).unwrap();
        assert_eq!(request["artifact_kind"], "prompt_request");
        assert_eq!(request["schema_version"], "0.1");
        assert_eq!(request["card"]["id"], "PR.UNNAMED.run-1");
        assert_eq!(request["card"]["name"], DEFAULT_CARD_NAME);
        assert_eq!(request["card"]["domain"], "firmware");
        assert_eq!(request["llm_profile_ref"], "");
        assert_eq!(request["output_constraints"], json!({}));
        assert_eq!(request["task_context"]["acceptance_criteria"], json!([]));
    }

    #[test]
    fn literal_bindings_accumulate_in_order() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            field_bindings: vec![
                literal("prompt_template.user_prompt", json!("A")),
                literal("prompt_template.user_prompt", json!("B")),
                literal("prompt_template.system_prompt", json!("sys")),
            ],
            ..MappingSpec::default()
        };

        let request = compile_prompt_request(&mapping, &store, &CompileOptions::default()).unwrap();
        assert_eq!(request["prompt_template"]["user_prompt"], "A\n\nB");
        assert_eq!(request["rendered_prompt"]["user_prompt"], "A\n\nB");
        assert_eq!(request["rendered_prompt"]["system_prompt"], "sys");
    }

    #[test]
    fn snippet_renders_prefix_body_and_suffix() {
        let artifact = json!({"design": {"summary": "Reads sensor data.\n"}});
        let rendered = render_snippet(&artifact, "design.summary", RenderMode::Inline, "## Design  ", "  end  ").unwrap();
        assert_eq!(rendered, "## Design\nReads sensor data.\nend");

        let artifact = json!({"design": {"summary": "Reads sensor data.", "owner": "fw"}});
        let rendered = render_snippet(&artifact, "design", RenderMode::YamlBlock, "", "").unwrap();
        assert_eq!(rendered, "summary: Reads sensor data.\nowner: fw");
    }

    #[test]
    fn missing_required_input_fails() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            inputs: vec![input("udd", None, true)],
            ..MappingSpec::default()
        };
        let error = compile_prompt_request(&mapping, &store, &CompileOptions::default()).unwrap_err();
        assert!(matches!(error, EngineError::MissingInput { input_id, .. } if input_id == "udd"));
    }

    #[test]
    fn optional_input_without_reference_blocks_snippets() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            inputs: vec![input("udd", None, false)],
            field_bindings: vec![snippet("task_context.notes", "udd", "")],
            ..MappingSpec::default()
        };
        let error = compile_prompt_request(&mapping, &store, &CompileOptions::default()).unwrap_err();
        assert!(matches!(error, EngineError::MissingInput { .. }));
    }

    #[test]
    fn undeclared_and_duplicate_inputs_are_configuration_errors() {
        let (_temp_dir, store) = empty_store();
        let undeclared = MappingSpec {
            field_bindings: vec![snippet("task_context.notes", "ghost", "")],
            ..MappingSpec::default()
        };
        assert!(matches!(
            compile_prompt_request(&undeclared, &store, &CompileOptions::default()),
            Err(EngineError::Configuration { .. })
        ));

        let duplicate = MappingSpec {
            inputs: vec![input("udd", None, false), input("udd", None, false)],
            ..MappingSpec::default()
        };
        assert!(matches!(
            compile_prompt_request(&duplicate, &store, &CompileOptions::default()),
            Err(EngineError::Configuration { .. })
        ));
    }

    #[test]
    fn unknown_source_type_is_unsupported() {
        let (_temp_dir, store) = empty_store();
        let mut binding = literal("task_context.notes", json!("x"));
        binding.source_type = "template".into();
        let mapping = MappingSpec {
            field_bindings: vec![binding],
            ..MappingSpec::default()
        };
        let error = compile_prompt_request(&mapping, &store, &CompileOptions::default()).unwrap_err();
        assert_eq!(error.to_string(), "unsupported source_type: 'template'");
    }

    #[test]
    fn binding_into_scalar_is_structural() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            field_bindings: vec![literal("artifact_kind.nested", json!("x"))],
            ..MappingSpec::default()
        };
        assert!(matches!(
            compile_prompt_request(&mapping, &store, &CompileOptions::default()),
            Err(EngineError::Structural(_))
        ));
    }

    #[test]
    fn flattened_rendered_prompt_is_structural() {
        let (_temp_dir, store) = empty_store();
        let mapping = MappingSpec {
            field_bindings: vec![literal("rendered_prompt", json!("flat"))],
            ..MappingSpec::default()
        };
        let error = compile_prompt_request(&mapping, &store, &CompileOptions::default()).unwrap_err();
        assert!(matches!(error, EngineError::Structural(_)));
        assert!(error.to_string().contains("rendered_prompt.system_prompt"));
    }
}
