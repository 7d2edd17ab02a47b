//! Package metadata: parsing the evaluated config tree and consolidating
//! the transitive dependency closure.
//!
//! Metadata is created on first request by short name and cached for the
//! invocation. Consolidation runs at most once per package: a set-guarded
//! BFS over the dependency closure absorbs every dependency's public
//! defines, public include directories (at the dependency's own priority),
//! and, for an application root, its output object into the link list. The
//! metadata timestamp is raised to the max across the closure so one
//! touched config rebuilds every downstream package.

use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::timestamps::TimestampCache;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// The default include priority of a package if one isn't defined.
const DEFAULT_INCLUDE_PRIORITY: i64 = 1000;

/// The type of package this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageType {
    #[default]
    Application,
    Library,
}

/// All the metadata representing a package.
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    /// The type of package this is.
    pub package_type: PackageType,
    /// The unique ID of this package.
    pub package_id: u64,

    /// The path of the package's root directory.
    pub package_path: PathBuf,
    /// The scratch directory for this package's intermediate build files.
    pub scratch_dir: PathBuf,
    /// The path of the final output object once the package is built.
    pub output_object: PathBuf,

    /// File extensions (with leading dot) mapped to the command templates
    /// that build source files of that extension.
    pub build_commands_by_extension: HashMap<String, String>,
    /// The command template that links this package.
    pub linker_command: String,

    /// Directories scanned recursively for source files, relative to the
    /// package root. The empty string is the root itself.
    pub source_directories: Vec<String>,
    /// Include directories shared with packages depending on this one.
    pub public_include_directories: Vec<String>,
    /// Include directories private to this package.
    pub include_directories: Vec<String>,
    /// Ordering of this package's include directories in consolidated
    /// include lists. Lower comes first.
    pub include_priority: i64,

    /// Defines shared with packages depending on this one. A leading `-`
    /// undefines the symbol during consolidation.
    pub public_defines: Vec<String>,
    /// Defines private to this package.
    pub defines: Vec<String>,
    /// Names of the packages this package directly depends on.
    pub dependencies: Vec<String>,
    /// Absolute paths of files excluded from the build.
    pub files_to_ignore: HashSet<PathBuf>,
    /// Libraries passed to `${shared_libraries}` when linking.
    pub shared_libraries: Vec<String>,

    /// Max mtime of this package's config and the global configs, raised
    /// during consolidation to the max across the dependency closure.
    pub metadata_timestamp: u64,

    /// Whether this package should skip building.
    pub should_skip: bool,
    /// Whether this package produces no output file.
    pub no_output_file: bool,

    /// Where to place the output object and assets, when set.
    pub destination_directory: Option<PathBuf>,
    /// Directories copied to the destination directory after a build.
    pub asset_directories: Vec<String>,

    /// Whether the consolidated fields below are populated.
    pub has_consolidated_information: bool,
    /// Deduped defines with undefines applied, in first-seen order.
    pub consolidated_defines: Vec<String>,
    /// The dependency closure in BFS order.
    pub consolidated_dependencies: Vec<String>,
    /// Include directories ordered by ascending priority, insertion order
    /// within a priority.
    pub consolidated_includes: Vec<PathBuf>,
    /// Output objects of dependency libraries to link, application roots
    /// only.
    pub consolidated_library_objects: Vec<PathBuf>,
}

impl PackageMetadata {
    pub fn is_application(&self) -> bool {
        self.package_type == PackageType::Application
    }

    pub fn is_library(&self) -> bool {
        self.package_type == PackageType::Library
    }

    /// The build command template for a source file, by extension.
    pub fn build_command_for(&self, source_file: &Path) -> Option<&str> {
        let extension = source_file.extension()?.to_str()?;
        self.build_commands_by_extension
            .get(&format!(".{extension}"))
            .map(String::as_str)
    }
}

/// Owning map of metadata records keyed by package name.
#[derive(Debug, Default)]
pub struct MetadataStore {
    metadata_by_name: HashMap<String, PackageMetadata>,
}

impl MetadataStore {
    pub fn get(&self, package_name: &str) -> Option<&PackageMetadata> {
        self.metadata_by_name.get(package_name)
    }

    pub fn contains(&self, package_name: &str) -> bool {
        self.metadata_by_name.contains_key(package_name)
    }

    fn get_mut(&mut self, package_name: &str) -> Option<&mut PackageMetadata> {
        self.metadata_by_name.get_mut(package_name)
    }

    fn insert(&mut self, package_name: String, metadata: PackageMetadata) {
        self.metadata_by_name.insert(package_name, metadata);
    }
}

/// Loads and consolidates a package's metadata, returning a borrow of the
/// finished record.
pub fn metadata_for_package<'ctx>(
    ctx: &'ctx mut BuildContext,
    package_name: &str,
) -> BuildResult<&'ctx PackageMetadata> {
    load_unconsolidated(ctx, package_name)?;
    if !ctx
        .metadata
        .get(package_name)
        .is_some_and(|metadata| metadata.has_consolidated_information)
    {
        consolidate(ctx, package_name)?;
    }
    Ok(ctx.metadata.get(package_name).unwrap())
}

/// Loads a package's metadata without consolidating it. No-op if already
/// loaded.
fn load_unconsolidated(ctx: &mut BuildContext, package_name: &str) -> BuildResult<()> {
    if ctx.metadata.contains(package_name) {
        return Ok(());
    }

    let package_path = ctx
        .registry
        .path_from_name(package_name)
        .ok_or_else(|| BuildError::unknown_package(package_name))?
        .to_path_buf();

    ctx.placeholders.set("package name", package_name);

    let package_id = ctx.ids.id_for_path(&ctx.layout, &package_path);
    let scratch_dir = ctx.layout.package_dir(package_id);
    let (config, metadata_timestamp) = ctx
        .config_source
        .package_config(&package_path, &scratch_dir)?;

    let mut metadata = PackageMetadata {
        package_id,
        package_path,
        scratch_dir,
        metadata_timestamp,
        ..Default::default()
    };
    parse_config(package_name, &config, ctx, &mut metadata)?;

    let output_directory = metadata
        .destination_directory
        .clone()
        .unwrap_or_else(|| metadata.scratch_dir.clone());
    let mut output_name = package_name.to_string();
    if let Some(extension) = config.get("output_extension").and_then(Value::as_str) {
        if !extension.is_empty() {
            output_name.push('.');
            output_name.push_str(extension);
        }
    }
    metadata.output_object = output_directory.join(output_name);

    ctx.metadata.insert(package_name.to_string(), metadata);
    Ok(())
}

/// Parses the recognized keys of an evaluated config tree into a metadata
/// record.
fn parse_config(
    package_name: &str,
    config: &Value,
    ctx: &mut BuildContext,
    metadata: &mut PackageMetadata,
) -> BuildResult<()> {
    match config.get("package_type").and_then(Value::as_str) {
        None => metadata.package_type = PackageType::Application,
        Some("application") => metadata.package_type = PackageType::Application,
        Some("library") => metadata.package_type = PackageType::Library,
        Some(other) => {
            return Err(BuildError::UnknownPackageType {
                package: package_name.to_string(),
                package_type: other.to_string(),
            })
        }
    }

    if let Some(build_commands) = config.get("build_commands").and_then(Value::as_object) {
        for (extension, template) in build_commands {
            if let Some(template) = template.as_str() {
                metadata
                    .build_commands_by_extension
                    .insert(format!(".{extension}"), template.to_string());
            }
        }
    }

    if let Some(linker_command) = config.get("linker_command").and_then(Value::as_str) {
        metadata.linker_command = linker_command.to_string();
    }

    metadata.no_output_file = integer_flag(config, "no_output_file");
    metadata.should_skip = integer_flag(config, "should_skip");

    if !metadata.no_output_file {
        metadata.source_directories = string_array(config, "source_directories");
    }
    metadata.public_include_directories = string_array(config, "public_include_directories");
    metadata.include_directories = string_array(config, "include_directories");
    metadata.public_defines = string_array(config, "public_defines");
    metadata.defines = string_array(config, "defines");
    metadata.dependencies = string_array(config, "dependencies");
    metadata.asset_directories = string_array(config, "asset_directories");
    metadata.shared_libraries = string_array(config, "shared_libraries");

    for file_to_ignore in string_array(config, "files_to_ignore") {
        metadata
            .files_to_ignore
            .insert(metadata.package_path.join(file_to_ignore));
    }

    metadata.include_priority = config
        .get("include_priority")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_INCLUDE_PRIORITY);

    if let Some(destination) = config.get("destination_directory").and_then(Value::as_str) {
        let expanded = ctx.placeholders.expand(destination);
        metadata.destination_directory = Some(PathBuf::from(expanded));
    }

    Ok(())
}

fn string_array(config: &Value, key: &str) -> Vec<String> {
    config
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn integer_flag(config: &Value, key: &str) -> bool {
    config
        .get(key)
        .and_then(Value::as_i64)
        .map(|value| value > 0)
        .unwrap_or(false)
}

/// Accumulates defines and undefines, first-seen order, `-` prefix means
/// undefine.
#[derive(Default)]
struct DefineSet {
    defines: Vec<String>,
    seen: HashSet<String>,
    undefines: HashSet<String>,
}

impl DefineSet {
    fn add(&mut self, define: &str) {
        if let Some(undefine) = define.strip_prefix('-') {
            self.undefines.insert(undefine.to_string());
        } else if self.seen.insert(define.to_string()) {
            self.defines.push(define.to_string());
        }
    }

    fn into_consolidated(self) -> Vec<String> {
        self.defines
            .into_iter()
            .filter(|define| !self.undefines.contains(define))
            .collect()
    }
}

fn add_include_directory(
    timestamps: &mut TimestampCache,
    includes_by_priority: &mut BTreeMap<i64, Vec<PathBuf>>,
    path: PathBuf,
    priority: i64,
) {
    if !timestamps.exists(&path) {
        return;
    }
    includes_by_priority.entry(priority).or_default().push(path);
}

/// Walks the dependency closure once and populates the consolidated
/// fields.
fn consolidate(ctx: &mut BuildContext, package_name: &str) -> BuildResult<()> {
    let root = ctx.metadata.get(package_name).unwrap();
    let root_is_application = root.is_application();
    let root_path = root.package_path.clone();
    let root_priority = root.include_priority;
    let root_defines: Vec<String> = root
        .defines
        .iter()
        .chain(root.public_defines.iter())
        .cloned()
        .collect();
    let root_includes: Vec<String> = root
        .include_directories
        .iter()
        .chain(root.public_include_directories.iter())
        .cloned()
        .collect();

    let mut encountered: HashSet<String> = HashSet::new();
    encountered.insert(package_name.to_string());
    let mut to_visit: VecDeque<String> = VecDeque::new();
    for dependency in &root.dependencies {
        if encountered.insert(dependency.clone()) {
            to_visit.push_back(dependency.clone());
        }
    }

    let mut defines = DefineSet::default();
    for define in &root_defines {
        defines.add(define);
    }

    let mut includes_by_priority: BTreeMap<i64, Vec<PathBuf>> = BTreeMap::new();
    for include_directory in &root_includes {
        add_include_directory(
            &mut ctx.timestamps,
            &mut includes_by_priority,
            root_path.join(include_directory),
            root_priority,
        );
    }

    let mut consolidated_dependencies = Vec::new();
    let mut library_objects = Vec::new();
    let mut metadata_timestamp = ctx.metadata.get(package_name).unwrap().metadata_timestamp;

    while let Some(dependency) = to_visit.pop_front() {
        consolidated_dependencies.push(dependency.clone());

        load_unconsolidated(ctx, &dependency).map_err(|error| match error {
            BuildError::UnknownPackage { .. } => BuildError::MissingDependency {
                package: package_name.to_string(),
                dependency: dependency.clone(),
            },
            other => other,
        })?;

        let child = ctx.metadata.get(&dependency).unwrap();
        if !child.is_library() {
            return Err(BuildError::dependency_not_library(package_name, &dependency));
        }

        if !child.no_output_file && root_is_application {
            library_objects.push(child.output_object.clone());
        }

        let child_path = child.package_path.clone();
        let child_priority = child.include_priority;
        let child_public_defines = child.public_defines.clone();
        let child_public_includes = child.public_include_directories.clone();
        let child_dependencies = child.dependencies.clone();
        metadata_timestamp = metadata_timestamp.max(child.metadata_timestamp);

        for define in &child_public_defines {
            defines.add(define);
        }
        for include_directory in &child_public_includes {
            add_include_directory(
                &mut ctx.timestamps,
                &mut includes_by_priority,
                child_path.join(include_directory),
                child_priority,
            );
        }
        for subdependency in child_dependencies {
            if encountered.insert(subdependency.clone()) {
                to_visit.push_back(subdependency);
            }
        }
    }

    let root = ctx.metadata.get_mut(package_name).unwrap();
    root.consolidated_defines = defines.into_consolidated();
    root.consolidated_dependencies = consolidated_dependencies;
    root.consolidated_includes = includes_by_priority.into_values().flatten().collect();
    root.consolidated_library_objects = library_objects;
    root.metadata_timestamp = metadata_timestamp;
    root.has_consolidated_information = true;
    Ok(())
}
