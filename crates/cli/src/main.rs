use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use bindery_engine::{
    ArtifactStore, CatalogueStore, CompileOptions, DirectStore, TaskCompiler, compile_prompt_request, encode, load_document,
    load_mapping_bundle, load_mapping_spec, load_repo_profile, validate_fields,
};
use bindery_types::{AnchorRef, ArtifactFormat, ArtifactRef, ValidationResult};
use bindery_util::{FsRepoAccess, RepoAccess};
use clap::{Arg, ArgAction, ArgMatches, Command};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    init_tracing();
    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("compile", sub)) => run_compile(sub),
        Some(("validate", sub)) => run_validate(sub),
        Some(("resolve", sub)) => run_resolve(sub),
        Some(("task", sub)) => run_task(sub),
        _ => bail!("expected a subcommand: compile, validate, resolve or task"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// `RUST_LOG` directives, or `info` when unset or unparsable.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_cli() -> Command {
    let format_arg = Arg::new("format")
        .long("format")
        .action(ArgAction::Set)
        .value_parser(["json", "yaml"])
        .default_value("yaml")
        .help("Output format");

    Command::new("bindery")
        .about("Bind artifacts into prompt requests and tasks")
        .subcommand_required(true)
        .arg(
            Arg::new("repo")
                .long("repo")
                .global(true)
                .action(ArgAction::Set)
                .default_value(".")
                .help("Target repository root"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(["direct", "catalogue"])
                .default_value("direct")
                .help("Artifact resolution strategy"),
        )
        .arg(
            Arg::new("no-fallback-glob")
                .long("no-fallback-glob")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not search by file name when the catalogue has no entry"),
        )
        .subcommand(
            Command::new("compile")
                .about("Compile a prompt mapping into a prompt request")
                .arg(Arg::new("mapping").long("mapping").short('m').required(true).action(ArgAction::Set))
                .arg(
                    Arg::new("override")
                        .long("override")
                        .action(ArgAction::Append)
                        .value_name("INPUT_ID=FILE")
                        .help("Use the document in FILE for an input instead of resolving it"),
                )
                .arg(Arg::new("card-suffix").long("card-suffix").action(ArgAction::Set))
                .arg(format_arg.clone())
                .arg(Arg::new("out").long("out").short('o').action(ArgAction::Set).help("Write to a file instead of stdout"))
                .arg(
                    Arg::new("save-anchor")
                        .long("save-anchor")
                        .action(ArgAction::Set)
                        .help("Save to the location registered for this catalogue anchor"),
                )
                .arg(
                    Arg::new("validate")
                        .long("validate")
                        .action(ArgAction::Set)
                        .help("Mapping bundle whose field rules the request must satisfy"),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a document against field rules")
                .arg(Arg::new("fields").long("fields").required(true).action(ArgAction::Set))
                .arg(Arg::new("document").long("document").required(true).action(ArgAction::Set)),
        )
        .subcommand(
            Command::new("resolve")
                .about("Show where an artifact resolves to")
                .arg(Arg::new("anchor").long("anchor").action(ArgAction::Set).conflicts_with_all(["kind", "id"]))
                .arg(Arg::new("kind").long("kind").action(ArgAction::Set).requires("id"))
                .arg(Arg::new("id").long("id").action(ArgAction::Set).requires("kind")),
        )
        .subcommand(
            Command::new("task")
                .about("Compile a task order against a mapping bundle")
                .arg(Arg::new("bundle-kind").long("bundle-kind").required(true).action(ArgAction::Set))
                .arg(Arg::new("bundle-id").long("bundle-id").required(true).action(ArgAction::Set))
                .arg(Arg::new("order").long("order").required(true).action(ArgAction::Set))
                .arg(Arg::new("project-kind").long("project-kind").action(ArgAction::Set).requires("project-id"))
                .arg(Arg::new("project-id").long("project-id").action(ArgAction::Set).requires("project-kind"))
                .arg(format_arg),
        )
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Option<&'a str> {
    matches.get_one::<String>(name).map(String::as_str)
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    arg(matches, name).with_context(|| format!("missing --{name}"))
}

/// Builds the store selected by the global flags, which every subcommand inherits.
fn open_store(matches: &ArgMatches) -> Result<ArtifactStore> {
    let repo_root = required_arg(matches, "repo")?;
    let repo_root = std::fs::canonicalize(repo_root).with_context(|| format!("repository root '{repo_root}' is not accessible"))?;
    let repo: Arc<dyn RepoAccess> = Arc::new(FsRepoAccess::new(repo_root.clone()));

    match arg(matches, "store") {
        Some("catalogue") => {
            let profile = load_repo_profile(&repo_root).context("failed to load the repo profile")?;
            debug!(profile_id = %profile.profile_id, "using catalogue store");
            let store = CatalogueStore::new(repo, profile.cm_catalogue).with_fallback_glob(!matches.get_flag("no-fallback-glob"));
            Ok(ArtifactStore::Catalogue(store))
        }
        _ => Ok(ArtifactStore::Direct(DirectStore::new(repo))),
    }
}

fn output_format(matches: &ArgMatches) -> ArtifactFormat {
    match arg(matches, "format") {
        Some("json") => ArtifactFormat::Json,
        _ => ArtifactFormat::Yaml,
    }
}

fn parse_override(spec: &str) -> Result<(String, PathBuf)> {
    let (input_id, file) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("override '{spec}' must look like INPUT_ID=FILE"))?;
    if input_id.trim().is_empty() || file.trim().is_empty() {
        bail!("override '{spec}' must look like INPUT_ID=FILE");
    }
    Ok((input_id.trim().to_string(), PathBuf::from(file.trim())))
}

fn load_overrides(matches: &ArgMatches) -> Result<IndexMap<String, Value>> {
    let mut overrides = IndexMap::new();
    for spec in matches.get_many::<String>("override").into_iter().flatten() {
        let (input_id, file) = parse_override(spec)?;
        let document = load_document(&file).with_context(|| format!("failed to load override for '{input_id}'"))?;
        overrides.insert(input_id, document);
    }
    Ok(overrides)
}

fn print_issues(result: &ValidationResult) {
    for issue in &result.issues {
        eprintln!("{issue}");
    }
}

fn run_compile(matches: &ArgMatches) -> Result<ExitCode> {
    let mapping_path = required_arg(matches, "mapping")?;
    let mapping = load_mapping_spec(mapping_path).with_context(|| format!("failed to load mapping '{mapping_path}'"))?;
    let store = open_store(matches)?;
    let options = CompileOptions {
        input_overrides: load_overrides(matches)?,
        card_id_suffix: arg(matches, "card-suffix").unwrap_or_default().to_string(),
    };

    let request = compile_prompt_request(&mapping, &store, &options).context("compilation failed")?;
    let rendered = encode(&request, output_format(matches))?;

    if let Some(anchor) = arg(matches, "save-anchor") {
        store.save_to_anchor(&AnchorRef::new(anchor), &rendered)?;
    }
    match arg(matches, "out") {
        Some(out) => write_output(Path::new(out), &rendered)?,
        None if arg(matches, "save-anchor").is_none() => println!("{rendered}"),
        None => {}
    }

    if let Some(bundle_path) = arg(matches, "validate") {
        let bundle = load_mapping_bundle(bundle_path).with_context(|| format!("failed to load rules '{bundle_path}'"))?;
        let result = validate_fields(&bundle.fields, &request);
        print_issues(&result);
        if !result.ok {
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn write_output(path: &Path, rendered: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    std::fs::write(path, rendered).with_context(|| format!("failed to write '{}'", path.display()))
}

fn run_validate(matches: &ArgMatches) -> Result<ExitCode> {
    let fields_path = required_arg(matches, "fields")?;
    let document_path = required_arg(matches, "document")?;
    let bundle = load_mapping_bundle(fields_path).with_context(|| format!("failed to load rules '{fields_path}'"))?;
    let document = load_document(document_path).with_context(|| format!("failed to load document '{document_path}'"))?;

    let result = validate_fields(&bundle.fields, &document);
    print_issues(&result);
    if result.ok {
        println!("ok");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn run_resolve(matches: &ArgMatches) -> Result<ExitCode> {
    let store = open_store(matches)?;

    if let Some(anchor) = arg(matches, "anchor") {
        let ArtifactStore::Catalogue(catalogue) = &store else {
            bail!("--anchor requires --store catalogue");
        };
        return match catalogue.locate(anchor)? {
            Some(resolution) => {
                println!(
                    "{}\t{}\t{}",
                    resolution.relpath.as_deref().unwrap_or("-"),
                    resolution.format,
                    resolution.reference
                );
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("anchor '{anchor}' is not registered");
                Ok(ExitCode::FAILURE)
            }
        };
    }

    let kind = required_arg(matches, "kind")?;
    let id = required_arg(matches, "id")?;
    let blob = store.fetch(id, kind)?;
    println!("{}\t{}\t{}", blob.relpath.as_deref().unwrap_or("-"), blob.format, blob.reference);
    Ok(ExitCode::SUCCESS)
}

fn run_task(matches: &ArgMatches) -> Result<ExitCode> {
    let bundle_ref = ArtifactRef::new(required_arg(matches, "bundle-kind")?, required_arg(matches, "bundle-id")?);
    let order_path = required_arg(matches, "order")?;
    let order = load_document(order_path).with_context(|| format!("failed to load task order '{order_path}'"))?;

    let mut compiler = TaskCompiler::new(open_store(matches)?, bundle_ref);
    if let (Some(kind), Some(id)) = (arg(matches, "project-kind"), arg(matches, "project-id")) {
        compiler = compiler.with_project(ArtifactRef::new(kind, id));
    }

    let compilation = compiler.compile_task(&order).context("task compilation failed")?;
    println!("{}", encode(&compilation.task, output_format(matches))?);
    for error in &compilation.errors {
        eprintln!("{error}");
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn log_level_follows_rust_log() {
        use tracing::level_filters::LevelFilter;

        temp_env::with_var("RUST_LOG", Some("debug"), || {
            assert_eq!(log_filter().max_level_hint(), Some(LevelFilter::DEBUG));
        });
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(log_filter().max_level_hint(), Some(LevelFilter::INFO));
        });
    }

    #[test]
    fn parses_overrides() {
        let (input_id, file) = parse_override("udd=fixtures/udd.yaml").unwrap();
        assert_eq!(input_id, "udd");
        assert_eq!(file, PathBuf::from("fixtures/udd.yaml"));

        assert!(parse_override("udd").is_err());
        assert!(parse_override("=file.yaml").is_err());
    }

    #[test]
    fn global_flags_reach_subcommands() {
        let matches = build_cli()
            .try_get_matches_from(["bindery", "resolve", "--anchor", "CM-1", "--store", "catalogue", "--no-fallback-glob"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(arg(sub, "anchor"), Some("CM-1"));
        assert_eq!(arg(sub, "store"), Some("catalogue"));
        assert_eq!(arg(sub, "repo"), Some("."));
        assert!(sub.get_flag("no-fallback-glob"));
    }

    #[test]
    fn compile_writes_requested_format() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("udd.yaml"), "summary: Counts pulses.\n").unwrap();
        let mapping = temp_dir.path().join("mapping.yaml");
        std::fs::write(
            &mapping,
            "inputs:\n  - {input_id: udd, ref: udd}\nfield_bindings:\n  - {target_field: task_context.goal, source_type: artifact_snippet, input_id: udd, artifact_path: summary, render_mode: inline}\n",
        )
        .unwrap();
        let out = temp_dir.path().join("out/request.json");

        let matches = build_cli()
            .try_get_matches_from([
                "bindery",
                "--repo",
                temp_dir.path().to_str().unwrap(),
                "compile",
                "--mapping",
                mapping.to_str().unwrap(),
                "--format",
                "json",
                "--out",
                out.to_str().unwrap(),
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        run_compile(sub).unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written["task_context"]["goal"], "Counts pulses.");
    }
}
