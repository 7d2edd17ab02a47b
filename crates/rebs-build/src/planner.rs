//! The build planner: walks packages in dependency order, decides which
//! source files need compiling, and emits compile/link/asset-copy/run
//! commands into the command queue.

use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::layout::ensure_directories_exist;
use crate::metadata::{self, PackageMetadata};
use crate::placeholder::{quote, quote_path, Placeholders};
use crate::queue::{CommandQueue, DeferredCommand, Stage, DEPS_FILE_PLACEHOLDER};
use crate::registry::package_name_from_path;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// The subdirectory of a package's scratch directory holding its object
/// files.
const OBJECTS_SUBDIRECTORY: &str = "objects";

#[derive(Default)]
pub struct Planner {
    queue: CommandQueue,
    built_packages: HashSet<String>,
    run_packages: HashSet<String>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn into_queue(self) -> CommandQueue {
        self.queue
    }

    /// Plans a build of every input package. Failures are reported and
    /// other inputs still plan; returns whether every package planned
    /// cleanly.
    pub fn build_packages(&mut self, ctx: &mut BuildContext) -> bool {
        let mut successful = true;
        for package_path in ctx.registry.input_packages(&ctx.inputs, &ctx.working_dir) {
            let package_name = package_name_from_path(&package_path);
            if let Err(error) = self.build_package(ctx, &package_name) {
                eprintln!("Unable to build \"{package_name}\": {error}");
                successful = false;
            }
        }
        successful
    }

    /// Plans a single package, its dependencies first when it is an
    /// application.
    fn build_package(&mut self, ctx: &mut BuildContext, package_name: &str) -> BuildResult<()> {
        if !self.built_packages.insert(package_name.to_string()) {
            return Ok(());
        }

        metadata::metadata_for_package(ctx, package_name)?;
        let metadata = ctx.metadata.get(package_name).unwrap();
        if metadata.should_skip {
            return Ok(());
        }

        // Applications build their dependent libraries first.
        if metadata.is_application() {
            let dependencies = metadata.consolidated_dependencies.clone();
            for dependency in dependencies {
                self.build_package(ctx, &dependency)?;
            }
        }

        let metadata = ctx.metadata.get(package_name).unwrap().clone();

        // Header-only and asset-only packages contribute metadata to their
        // dependents and copy assets, but compile and link nothing.
        if !metadata.no_output_file {
            self.plan_compiles_and_link(ctx, package_name, &metadata);
        }

        self.plan_asset_copies(ctx, &metadata);
        Ok(())
    }

    /// Queues the compiles for a package's stale sources and, when
    /// anything was scheduled or a dependency library is newer, its link.
    fn plan_compiles_and_link(
        &mut self,
        ctx: &mut BuildContext,
        package_name: &str,
        metadata: &PackageMetadata,
    ) {
        let placeholders = package_placeholders(ctx, package_name, metadata);
        let mut link_objects = Vec::new();
        let mut requires_linking =
            self.plan_compiles(ctx, metadata, &placeholders, &mut link_objects);

        let mut output_object_timestamp = 0;
        if !requires_linking && ctx.timestamps.exists(&metadata.output_object) {
            output_object_timestamp = ctx.timestamps.timestamp_of(&metadata.output_object);
        } else {
            requires_linking = true;
        }

        for library_object in &metadata.consolidated_library_objects {
            link_objects.push(library_object.clone());
            if !requires_linking {
                let library_timestamp = ctx.timestamps.timestamp_of(library_object);
                if library_timestamp == 0 || library_timestamp > output_object_timestamp {
                    requires_linking = true;
                }
            }
        }

        if requires_linking {
            // Downstream packages must see the scheduled output as fresh
            // within this invocation, even though it is not on disk yet.
            ctx.timestamps.set_to_now(&metadata.output_object);

            let mut link_placeholders = placeholders.clone();
            link_placeholders.set("in", join_quoted(&link_objects));
            link_placeholders.set("out", quote_path(&metadata.output_object));
            self.queue.queue(
                linker_stage(metadata),
                DeferredCommand {
                    command: link_placeholders.expand(&metadata.linker_command),
                    package_id: metadata.package_id,
                    source_file: None,
                    destination_file: Some(metadata.output_object.clone()),
                },
            );
        }
    }

    /// Walks the package's source directories and queues a compile for
    /// every stale object. Returns whether anything was queued; fills
    /// `link_objects` with every object regardless of staleness.
    fn plan_compiles(
        &mut self,
        ctx: &mut BuildContext,
        metadata: &PackageMetadata,
        placeholders: &Placeholders,
        link_objects: &mut Vec<PathBuf>,
    ) -> bool {
        let objects_dir = metadata.scratch_dir.join(OBJECTS_SUBDIRECTORY);
        let mut scheduled = false;

        for source_directory in &metadata.source_directories {
            let source_root = join_non_empty(&metadata.package_path, source_directory);
            let output_root = join_non_empty(&objects_dir, source_directory);

            for source_file in walk_files(&source_root) {
                let Some(template) = metadata.build_command_for(&source_file) else {
                    continue;
                };
                if metadata.files_to_ignore.contains(&source_file) {
                    continue;
                }

                let relative = source_file
                    .strip_prefix(&source_root)
                    .unwrap_or(&source_file);
                let mut object_file = output_root.join(relative);
                append_extension(&mut object_file, "o");
                link_objects.push(object_file.clone());

                if !ctx.deps.is_stale(
                    &mut ctx.timestamps,
                    &ctx.layout,
                    metadata.package_id,
                    metadata.metadata_timestamp,
                    &object_file,
                ) {
                    continue;
                }

                if let Some(parent) = object_file.parent() {
                    ensure_directories_exist(parent);
                }
                let mut compile_placeholders = placeholders.clone();
                compile_placeholders.set("in", quote_path(&source_file));
                compile_placeholders.set("out", quote_path(&object_file));
                self.queue.queue(
                    Stage::Compile,
                    DeferredCommand {
                        command: compile_placeholders.expand(template),
                        package_id: metadata.package_id,
                        source_file: Some(source_file),
                        destination_file: Some(object_file),
                    },
                );
                scheduled = true;
            }
        }
        scheduled
    }

    /// Queues copies for assets newer than their destination.
    fn plan_asset_copies(&mut self, ctx: &mut BuildContext, metadata: &PackageMetadata) {
        let Some(destination_root) = &metadata.destination_directory else {
            return;
        };

        for asset_directory in &metadata.asset_directories {
            let source_root = metadata.package_path.join(asset_directory);
            let output_root = destination_root.join(asset_directory);

            for source_file in walk_files(&source_root) {
                let relative = source_file
                    .strip_prefix(&source_root)
                    .unwrap_or(&source_file);
                let destination_file = output_root.join(relative);

                if ctx.timestamps.timestamp_of(&source_file)
                    <= ctx.timestamps.timestamp_of(&destination_file)
                {
                    continue;
                }
                if let Some(parent) = destination_file.parent() {
                    ensure_directories_exist(parent);
                }
                self.queue.queue(
                    Stage::CopyAssets,
                    DeferredCommand {
                        command: format!(
                            "cp {} {}",
                            quote_path(&source_file),
                            quote_path(&destination_file)
                        ),
                        package_id: metadata.package_id,
                        source_file: Some(source_file),
                        destination_file: Some(destination_file.clone()),
                    },
                );
                ctx.timestamps.set_to_now(&destination_file);
            }
        }
    }

    /// Plans the run phase: the global run command when configured,
    /// otherwise one run per application input. Having nothing to run is a
    /// user error.
    pub fn run_packages(&mut self, ctx: &mut BuildContext) -> BuildResult<()> {
        if let Some(global_run_command) = ctx.config.global_run_command.clone() {
            let command = ctx.placeholders.expand(&global_run_command);
            self.queue.queue(
                Stage::Run,
                DeferredCommand {
                    command,
                    package_id: 0,
                    source_file: None,
                    destination_file: None,
                },
            );
            return Ok(());
        }

        let mut queued = 0;
        for package_path in ctx.registry.input_packages(&ctx.inputs, &ctx.working_dir) {
            let package_name = package_name_from_path(&package_path);
            if !self.run_packages.insert(package_name.clone()) {
                continue;
            }
            let metadata = match metadata::metadata_for_package(ctx, &package_name) {
                Ok(metadata) => metadata,
                Err(error) => {
                    eprintln!("{error}");
                    continue;
                }
            };
            if !metadata.is_application() {
                continue;
            }
            self.queue.queue(
                Stage::Run,
                DeferredCommand {
                    command: quote_path(&metadata.output_object),
                    package_id: metadata.package_id,
                    source_file: None,
                    destination_file: None,
                },
            );
            queued += 1;
        }

        if queued == 0 {
            return Err(BuildError::NothingToRun);
        }
        Ok(())
    }
}

/// The placeholder table for one package's planning step: the context's
/// global values plus the package-specific ones. `${deps file}` is bound to
/// its own literal so it survives to execution time.
fn package_placeholders(
    ctx: &BuildContext,
    package_name: &str,
    metadata: &PackageMetadata,
) -> Placeholders {
    let mut placeholders = ctx.placeholders.clone();
    placeholders.set("package name", package_name);
    placeholders.set("deps file", DEPS_FILE_PLACEHOLDER);
    placeholders.set(
        "cdefines",
        metadata
            .consolidated_defines
            .iter()
            .map(|define| format!("-D{define}"))
            .collect::<Vec<_>>()
            .join(" "),
    );
    placeholders.set(
        "cincludes",
        metadata
            .consolidated_includes
            .iter()
            .map(|include| format!("-I{}", quote_path(include)))
            .collect::<Vec<_>>()
            .join(" "),
    );
    placeholders.set(
        "shared_libraries",
        metadata
            .shared_libraries
            .iter()
            .map(|library| format!("-l {}", quote(library)))
            .collect::<Vec<_>>()
            .join(" "),
    );
    placeholders
}

fn linker_stage(metadata: &PackageMetadata) -> Stage {
    if metadata.is_application() {
        Stage::LinkApplication
    } else {
        Stage::LinkLibrary
    }
}

/// Space-joined quoted paths, the `${in}` of a link command.
fn join_quoted(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| quote_path(path))
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_non_empty(base: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}

/// Appends `.ext` to a path's full filename, `foo.cc` becoming `foo.cc.o`.
fn append_extension(path: &mut PathBuf, extension: &str) {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_name.push('.');
    file_name.push_str(extension);
    path.set_file_name(file_name);
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Recursively yields the non-hidden files under `root`, in a stable
/// order.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_extension_keeps_the_original_one() {
        let mut path = PathBuf::from("/out/objects/main.cc");
        append_extension(&mut path, "o");
        assert_eq!(path, PathBuf::from("/out/objects/main.cc.o"));
    }

    #[test]
    fn test_join_non_empty() {
        assert_eq!(
            join_non_empty(Path::new("/pkg"), ""),
            PathBuf::from("/pkg")
        );
        assert_eq!(
            join_non_empty(Path::new("/pkg"), "src"),
            PathBuf::from("/pkg/src")
        );
    }

    #[test]
    fn test_walk_files_skips_hidden_entries() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        std::fs::write(temp.path().join(".git").join("config"), "x").unwrap();
        std::fs::write(temp.path().join(".hidden"), "x").unwrap();
        std::fs::create_dir(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src").join("main.cc"), "x").unwrap();

        let files = walk_files(temp.path());
        assert_eq!(files, vec![temp.path().join("src").join("main.cc")]);
    }
}
