//! Interpreter for a package's `third_party.json`.
//!
//! The file names remote repositories to materialize and a list of
//! operations that stage their contents into the package tree. Operations
//! run in order against a list-valued placeholder table seeded with `${@}`,
//! the package root. Every file an operation produces is recorded into
//! `.third_party_files.json`, which doubles as the up-to-date marker and
//! the manifest for cleaning.

use crate::expand::MultiPlaceholders;
use crate::repositories::{repository_key, RepositoryRegistry};
use crate::{VendorError, VendorResult};
use rebs_build::exec;
use rebs_build::layout::ensure_directories_exist;
use rebs_config::evaluator::file_timestamp;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The vendoring description at a package root.
const THIRD_PARTY_FILE: &str = "third_party.json";

/// The record of every produced file, and the up-to-date marker.
const THIRD_PARTY_FILES_FILE: &str = ".third_party_files.json";

/// Files produced by the operations, recorded for cleaning.
type ProducedFiles = BTreeMap<String, bool>;

/// Updates a package's third-party code if its description is newer than
/// the last recorded run.
pub fn update_third_party(
    package_path: &Path,
    registry: &mut RepositoryRegistry,
) -> VendorResult<()> {
    let description_path = package_path.join(THIRD_PARTY_FILE);
    if !description_path.exists() {
        return Ok(());
    }

    let record_path = package_path.join(THIRD_PARTY_FILES_FILE);
    if file_timestamp(&record_path) >= file_timestamp(&description_path) {
        return Ok(());
    }

    println!(
        "Updating third party packages for {}...",
        rebs_build::registry::package_name_from_path(package_path)
    );

    let contents = fs::read_to_string(&description_path)?;
    let config: Value =
        serde_json::from_str(&contents).map_err(|error| VendorError::ParseError {
            path: description_path.clone(),
            error,
        })?;

    let mut placeholders = MultiPlaceholders::new();
    placeholders.set_single("@", package_path.display().to_string());

    if let Some(repositories) = config.get("repositories").and_then(Value::as_array) {
        for repository in repositories {
            load_repository(repository, &mut placeholders, registry)?;
        }
    }
    registry.flush();

    let mut produced = ProducedFiles::new();
    if let Some(operations) = config.get("operations").and_then(Value::as_array) {
        for operation in operations {
            execute_operation(operation, &mut placeholders, &mut produced)?;
        }
    }

    let record: Value = produced
        .iter()
        .map(|(file, kept)| (file.clone(), Value::Bool(*kept)))
        .collect::<serde_json::Map<String, Value>>()
        .into();
    fs::write(&record_path, serde_json::to_string_pretty(&record)?.as_bytes())
        .map_err(VendorError::Io)?;

    Ok(())
}

/// Runs the update before a build when `--update` was given, or when the
/// package has a vendoring description but no produced-files record yet.
pub fn maybe_update_before_building(
    package_path: &Path,
    registry: &mut RepositoryRegistry,
    update_requested: bool,
) -> VendorResult<()> {
    let should_update = update_requested
        || (package_path.join(THIRD_PARTY_FILE).exists()
            && !package_path.join(THIRD_PARTY_FILES_FILE).exists());
    if !should_update {
        return Ok(());
    }
    update_third_party(package_path, registry)
}

/// Removes every file a previous update produced, and the record itself.
pub fn clean_third_party(package_path: &Path) -> VendorResult<()> {
    let record_path = package_path.join(THIRD_PARTY_FILES_FILE);
    let Ok(contents) = fs::read_to_string(&record_path) else {
        return Ok(());
    };
    let record: Value = serde_json::from_str(&contents).map_err(|error| VendorError::ParseError {
        path: record_path.clone(),
        error,
    })?;

    if let Some(files) = record.as_object() {
        for path in files.keys() {
            let path = Path::new(path);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
    }
    fs::remove_file(&record_path)?;
    Ok(())
}

/// Materializes one repository and binds its placeholder to the cache
/// directory.
fn load_repository(
    repository: &Value,
    placeholders: &mut MultiPlaceholders,
    registry: &mut RepositoryRegistry,
) -> VendorResult<()> {
    let repository_type = string_field(repository, "type");
    let url = string_field(repository, "url");
    let placeholder = string_field(repository, "placeholder");
    if repository_type.is_empty() || url.is_empty() || placeholder.is_empty() {
        return Err(VendorError::InvalidRepository);
    }

    let key = repository_key(&repository_type, &url);
    let mut directory = registry.directory_for_key(&key);

    match repository_type.as_str() {
        "download" => {
            ensure_directories_exist(&directory);
            let filename = url.rsplit('/').next().unwrap_or(&url);
            let file_path = directory.join(filename);
            if !file_path.exists() {
                println!("Downloading {url}");
                run_shell(&format!(
                    "curl -L {url} --output {}",
                    file_path.display()
                ))?;
            }
        }
        "git" => {
            if directory.exists() {
                println!("Updating {url}");
                run_shell(&format!("git -C {} pull", directory.display()))?;
            } else {
                println!("Cloning {url}");
                run_shell(&format!("git clone {url} {}", directory.display()))?;
            }
        }
        "zip" => {
            ensure_directories_exist(&directory);
            let zip_path = directory.join("download.zip");
            if !zip_path.exists() {
                println!("Downloading {url}");
                run_shell(&format!("curl -L {url} --output {}", zip_path.display()))?;
            }
            let extracted = directory.join("extracted");
            if !extracted.exists() {
                run_shell(&format!(
                    "unzip {} -d {}",
                    zip_path.display(),
                    extracted.display()
                ))?;
            }
            directory = extracted;
        }
        other => return Err(VendorError::UnknownRepositoryType(other.to_string())),
    }

    placeholders.set_single(&placeholder, directory.display().to_string());
    Ok(())
}

fn execute_operation(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
    produced: &mut ProducedFiles,
) -> VendorResult<()> {
    match string_field(operation, "operation").as_str() {
        "copy" => execute_copy(operation, placeholders, produced),
        "createDirectory" => execute_create_directory(operation, placeholders),
        "evaluate" => execute_evaluate(operation, placeholders),
        "execute" => execute_execute(operation, placeholders, produced),
        "joinArray" => execute_join_array(operation, placeholders),
        "readFilesInDirectory" => execute_read_files_in_directory(operation, placeholders),
        "readRegExFromFile" => execute_read_regex_from_file(operation, placeholders),
        "set" => execute_set(operation, placeholders),
        other => Err(VendorError::UnknownOperation(other.to_string())),
    }
}

/// Per-destination content edits a copy operation can request.
#[derive(Default)]
struct CopyEdits {
    replacements: BTreeMap<String, Vec<(String, String)>>,
    prepends: BTreeMap<String, String>,
}

fn execute_copy(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
    produced: &mut ProducedFiles,
) -> VendorResult<()> {
    let sources = evaluate_paths(value_strings(&operation["source"]), placeholders);
    let destinations = evaluate_paths(value_strings(&operation["destination"]), placeholders);
    if sources.len() != destinations.len() {
        return Err(VendorError::CopyCountMismatch {
            sources: sources.len(),
            destinations: destinations.len(),
        });
    }

    let edits = collect_copy_edits(operation, placeholders);

    let mut excludes = BTreeSet::new();
    if let Some(exclude) = operation.get("exclude") {
        excludes.extend(evaluate_paths(value_strings(exclude), placeholders));
    }

    for (source, destination) in sources.iter().zip(&destinations) {
        let source = PathBuf::from(source);
        let destination = PathBuf::from(destination);
        if !source.exists() {
            return Err(VendorError::MissingSource(source));
        }

        if source.is_dir() {
            for entry in files_under(&source) {
                let relative = entry.strip_prefix(&source).unwrap_or(&entry);
                let destination_file = destination.join(relative);
                if excludes.contains(&destination_file.display().to_string()) {
                    continue;
                }
                copy_file(&entry, &destination_file, &edits, produced)?;
            }
        } else {
            copy_file(&source, &destination, &edits, produced)?;
        }
    }
    Ok(())
}

fn collect_copy_edits(operation: &Value, placeholders: &MultiPlaceholders) -> CopyEdits {
    let mut edits = CopyEdits::default();
    let Some(replace) = operation.get("replace").and_then(Value::as_array) else {
        return edits;
    };

    for edit in replace {
        let files = evaluate_paths(value_strings(&edit["file"]), placeholders);
        for file in &files {
            if let Some(replacements) = edit.get("replacements").and_then(Value::as_array) {
                for pair in replacements {
                    let Some(pair) = pair.as_array().filter(|pair| pair.len() == 2) else {
                        continue;
                    };
                    let needles =
                        placeholders.expand(pair[0].as_str().unwrap_or_default());
                    let values = placeholders.expand(pair[1].as_str().unwrap_or_default());
                    for needle in &needles {
                        for value in &values {
                            edits
                                .replacements
                                .entry(file.clone())
                                .or_default()
                                .push((needle.clone(), value.clone()));
                        }
                    }
                }
            }
            if let Some(prepend) = edit.get("prepend").and_then(Value::as_str) {
                if let Some(expanded) = placeholders.expand(prepend).into_iter().next() {
                    edits.prepends.insert(file.clone(), expanded);
                }
            }
        }
    }
    edits
}

/// Copies one file, applying any content edits registered for the
/// destination. Unedited copies are skipped when the destination is at
/// least as new as the source.
fn copy_file(
    from: &Path,
    to: &Path,
    edits: &CopyEdits,
    produced: &mut ProducedFiles,
) -> VendorResult<()> {
    if let Some(parent) = to.parent() {
        ensure_directories_exist(parent);
    }
    let destination_key = to.display().to_string();
    produced.insert(destination_key.clone(), true);

    let needs_edits = edits.replacements.contains_key(&destination_key)
        || edits.prepends.contains_key(&destination_key);

    if to.exists() && !needs_edits && file_timestamp(from) <= file_timestamp(to) {
        return Ok(());
    }

    if needs_edits {
        let mut contents = fs::read_to_string(from)?;
        if let Some(prepend) = edits.prepends.get(&destination_key) {
            contents = format!("{prepend}{contents}");
        }
        if let Some(replacements) = edits.replacements.get(&destination_key) {
            for (needle, value) in replacements {
                contents = contents.replace(needle, value);
            }
        }
        fs::write(to, contents)?;
    } else {
        fs::copy(from, to)?;
    }
    println!("Copying {}", to.display());
    Ok(())
}

fn execute_create_directory(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
) -> VendorResult<()> {
    for path in evaluate_paths(value_strings(&operation["path"]), placeholders) {
        ensure_directories_exist(Path::new(&path));
    }
    Ok(())
}

/// Evaluates expressions with python3 and binds the results.
fn execute_evaluate(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
) -> VendorResult<()> {
    let Some(values) = operation.get("values").and_then(Value::as_object) else {
        return Ok(());
    };
    for (name, value) in values {
        let expressions = placeholders.expand_all(&value_strings(value));
        let mut results = Vec::with_capacity(expressions.len());
        for expression in &expressions {
            results.push(evaluate_expression(expression)?);
        }
        placeholders.set(name, results);
    }
    Ok(())
}

fn evaluate_expression(expression: &str) -> VendorResult<String> {
    let escaped = expression.replace('"', "\\\"");
    let mut output = String::new();
    if !exec::execute_command(
        &format!("python3 -c \"print({escaped})\""),
        Some(&mut output),
    ) {
        return Err(VendorError::EvaluateFailed(expression.to_string()));
    }
    Ok(output.trim_end_matches('\n').to_string())
}

/// Runs a command, gated on input/output timestamps unless `alwaysRun`.
fn execute_execute(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
    produced: &mut ProducedFiles,
) -> VendorResult<()> {
    let mut newest_input: Option<u64> = None;
    if let Some(inputs) = operation.get("inputs") {
        for input in evaluate_paths(value_strings(inputs), placeholders) {
            let input = PathBuf::from(input);
            if !input.exists() {
                return Err(VendorError::MissingInput(input));
            }
            let timestamp = file_timestamp(&input);
            newest_input = Some(newest_input.map_or(timestamp, |t| t.max(timestamp)));
        }
    }

    let mut oldest_output: Option<u64> = None;
    let mut missing_output = false;
    let mut outputs = Vec::new();
    if let Some(declared) = operation.get("outputs") {
        for output in evaluate_paths(value_strings(declared), placeholders) {
            let output = PathBuf::from(output);
            produced.insert(output.display().to_string(), true);
            if output.exists() {
                let timestamp = file_timestamp(&output);
                oldest_output = Some(oldest_output.map_or(timestamp, |t| t.min(timestamp)));
            } else {
                missing_output = true;
                if let Some(parent) = output.parent() {
                    ensure_directories_exist(parent);
                }
            }
            outputs.push(output);
        }
    }

    let always_run = operation
        .get("alwaysRun")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !always_run && !missing_output {
        if let (Some(newest_input), Some(oldest_output)) = (newest_input, oldest_output) {
            if newest_input < oldest_output {
                return Ok(());
            }
        }
    }

    for output in &outputs {
        if output.exists() {
            fs::remove_file(output)?;
        }
    }

    let command = placeholders
        .expand(&string_field(operation, "command"))
        .into_iter()
        .next()
        .unwrap_or_default();
    let directory = operation
        .get("directory")
        .and_then(Value::as_str)
        .and_then(|directory| placeholders.expand(directory).into_iter().next());

    let final_command = match directory {
        Some(directory) if !directory.is_empty() => format!("cd {directory} && {command}"),
        _ => command,
    };
    println!("Executing: {final_command}");
    run_shell(&final_command)
}

fn execute_join_array(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
) -> VendorResult<()> {
    let values = placeholders.expand_all(&value_strings(&operation["value"]));
    let joint = placeholders
        .expand(&string_field(operation, "joint"))
        .into_iter()
        .next()
        .unwrap_or_default();

    let name = string_field(operation, "placeholder");
    placeholders.set(&name, vec![values.join(&joint)]);
    Ok(())
}

fn execute_read_files_in_directory(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
) -> VendorResult<()> {
    let directories = placeholders.expand_all(&value_strings(&operation["path"]));
    let full_path = operation
        .get("fullPath")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let extensions: BTreeSet<String> = operation
        .get("extensions")
        .and_then(Value::as_array)
        .map(|extensions| {
            extensions
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut files_found = Vec::new();
    for directory in &directories {
        let directory = Path::new(directory);
        if !directory.exists() {
            return Err(VendorError::MissingDirectory(directory.to_path_buf()));
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(directory)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        for path in entries {
            if !extensions.is_empty() {
                let extension = path
                    .extension()
                    .map(|extension| format!(".{}", extension.to_string_lossy()))
                    .unwrap_or_default();
                if !extensions.contains(&extension) {
                    continue;
                }
            }
            let value = if full_path {
                path.display().to_string()
            } else {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            };
            files_found.push(value);
        }
    }

    let name = string_field(operation, "placeholder");
    placeholders.set(&name, files_found);
    Ok(())
}

fn execute_read_regex_from_file(
    operation: &Value,
    placeholders: &mut MultiPlaceholders,
) -> VendorResult<()> {
    let files = evaluate_paths(value_strings(&operation["file"]), placeholders);
    let Some(file) = files.first() else {
        return Err(VendorError::MissingSource(PathBuf::new()));
    };
    let path = Path::new(file);
    if !path.exists() {
        return Err(VendorError::MissingSource(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;

    let Some(values) = operation.get("values").and_then(Value::as_object) else {
        return Ok(());
    };
    for (capture_names, pattern) in values {
        let Some(pattern) = pattern.as_str() else {
            continue;
        };
        let regex = Regex::new(pattern)?;
        let Some(captures) = regex.captures(&contents) else {
            continue;
        };
        for (index, name) in capture_names.split(',').enumerate() {
            if name.is_empty() {
                continue;
            }
            if let Some(capture) = captures.get(index) {
                placeholders.set(name, vec![capture.as_str().to_string()]);
            }
        }
    }
    Ok(())
}

fn execute_set(operation: &Value, placeholders: &mut MultiPlaceholders) -> VendorResult<()> {
    let Some(values) = operation.get("values").and_then(Value::as_object) else {
        return Ok(());
    };
    for (name, value) in values {
        let results = placeholders.expand_all(&value_strings(value));
        placeholders.set(name, results);
    }
    Ok(())
}

/// A string-or-array-of-strings JSON value as a list.
fn value_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(value) => vec![value.clone()],
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Resolves paths against the package root (`${@}`) unless they start with
/// a placeholder, then expands them.
fn evaluate_paths(paths: Vec<String>, placeholders: &MultiPlaceholders) -> Vec<String> {
    let mut resolved = Vec::new();
    for path in paths {
        let raw = if path.starts_with('$') {
            path
        } else {
            format!("${{@}}/{path}")
        };
        resolved.extend(placeholders.expand(&raw));
    }
    resolved
}

fn run_shell(command: &str) -> VendorResult<()> {
    if exec::execute_command_passthrough(command) {
        Ok(())
    } else {
        Err(VendorError::CommandFailed(command.to_string()))
    }
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = fs::read_dir(root) else {
        return files;
    };
    let mut entries: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}
