//! Stage-ordered command queue and the parallel scheduler that drains it.
//!
//! Commands queue into stages that execute strictly in order; within a
//! stage they run unordered on a bounded worker pool. The `Run` stage (and
//! every stage in verbose mode) runs sequentially with the terminal
//! attached. Compile workers substitute `${deps file}` with a worker-unique
//! path just before spawning, and record the compiler's dependency output
//! against the destination file afterwards. A failing command flips a
//! shared flag; in-flight siblings run to completion and no later stage
//! starts.

use crate::deps::DependencyStore;
use crate::exec;
use crate::layout::TempLayout;
use crate::placeholder::{quote_path, replace_first};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The placeholder compile commands carry for the compiler's dependency
/// output file. Substituted per worker at execution time, never at
/// planning time.
pub const DEPS_FILE_PLACEHOLDER: &str = "${deps file}";

/// A build stage. Stages execute in the order they are declared; commands
/// within a stage may run in parallel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Individual source files compile.
    Compile,
    /// Libraries link.
    LinkLibrary,
    /// Applications link against the built objects and libraries.
    LinkApplication,
    /// Asset trees copy to destination directories.
    CopyAssets,
    /// Applications run.
    Run,
}

/// A command queued for later execution.
#[derive(Debug, Clone)]
pub struct DeferredCommand {
    /// The command line, fully substituted except possibly
    /// `${deps file}`.
    pub command: String,
    /// The package the command builds, for dependency recording.
    pub package_id: u64,
    /// The source file being compiled, when applicable.
    pub source_file: Option<PathBuf>,
    /// The file the command produces, when applicable.
    pub destination_file: Option<PathBuf>,
}

/// Settings for draining the queue.
pub struct ExecutionSettings<'a> {
    pub layout: &'a TempLayout,
    pub parallel_tasks: usize,
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    commands_by_stage: BTreeMap<Stage, Vec<DeferredCommand>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command to a stage.
    pub fn queue(&mut self, stage: Stage, command: DeferredCommand) {
        self.commands_by_stage
            .entry(stage)
            .or_default()
            .push(command);
    }

    /// The commands queued for a stage.
    pub fn commands(&self, stage: Stage) -> &[DeferredCommand] {
        self.commands_by_stage
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total_commands(&self) -> usize {
        self.commands_by_stage.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_commands() == 0
    }

    /// Drains every stage in order. Returns whether every command
    /// succeeded; on failure the aggregated output of the failing commands
    /// has been flushed to stderr.
    pub fn run_all(&self, settings: &ExecutionSettings, deps: &mut DependencyStore) -> bool {
        let (successful, errors) = self.run_all_capturing(settings, deps);
        if !errors.is_empty() {
            eprint!("{errors}");
        }
        successful
    }

    /// `run_all`, but hands the aggregated error output back instead of
    /// printing it.
    pub fn run_all_capturing(
        &self,
        settings: &ExecutionSettings,
        deps: &mut DependencyStore,
    ) -> (bool, String) {
        let total = self.total_commands();
        if total == 0 {
            return (true, String::new());
        }

        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::with_template("Running {pos}/{len}")
                .expect("static progress template"),
        );

        let deps_mutex = Mutex::new(deps);
        let mut errors = String::new();
        let mut successful = true;

        for (stage, commands) in &self.commands_by_stage {
            if commands.is_empty() {
                continue;
            }
            if !execute_stage(*stage, commands, &progress, settings, &deps_mutex, &mut errors) {
                successful = false;
                break;
            }
        }

        progress.finish_and_clear();
        (successful, errors)
    }
}

fn execute_stage(
    stage: Stage,
    commands: &[DeferredCommand],
    progress: &ProgressBar,
    settings: &ExecutionSettings,
    deps: &Mutex<&mut DependencyStore>,
    errors: &mut String,
) -> bool {
    let record_dependencies = stage == Stage::Compile;
    if stage == Stage::Run || settings.verbose {
        return execute_sequentially(commands, progress, settings, deps, record_dependencies);
    }

    let worker_count = commands.len().min(settings.parallel_tasks).max(1);
    let cursor = Mutex::new(0usize);
    let stage_successful = AtomicBool::new(true);
    let error_sink = Mutex::new(&mut *errors);

    std::thread::scope(|scope| {
        for worker_index in 0..worker_count {
            let cursor = &cursor;
            let stage_successful = &stage_successful;
            let error_sink = &error_sink;
            scope.spawn(move || {
                let depfile = DependencyStore::worker_depfile_path(settings.layout, worker_index);
                let quoted_depfile = quote_path(&depfile);
                let mut worker_successful = true;
                let mut output = String::new();

                loop {
                    let index = {
                        let mut cursor = cursor.lock().expect("queue cursor poisoned");
                        if *cursor >= commands.len() {
                            break;
                        }
                        let index = *cursor;
                        *cursor += 1;
                        progress.inc(1);
                        index
                    };
                    let command = &commands[index];

                    if record_dependencies {
                        let (command_line, uses_depfile) =
                            replace_first(&command.command, DEPS_FILE_PLACEHOLDER, &quoted_depfile);
                        if exec::execute_command(&command_line, Some(&mut output)) {
                            let dependencies = if uses_depfile {
                                DependencyStore::read_compiler_depfile(&depfile)
                            } else {
                                command.source_file.iter().cloned().collect()
                            };
                            record(deps, settings.layout, command, dependencies);
                        } else {
                            worker_successful = false;
                        }
                    } else if !exec::execute_command(&command.command, Some(&mut output)) {
                        worker_successful = false;
                    }
                }

                if !worker_successful {
                    error_sink
                        .lock()
                        .expect("error sink poisoned")
                        .push_str(&output);
                    stage_successful.store(false, Ordering::SeqCst);
                }
            });
        }
    });

    stage_successful.load(Ordering::SeqCst)
}

/// Sequential path for the `Run` stage and verbose mode: the terminal is
/// attached, so the progress line is suspended around each command.
fn execute_sequentially(
    commands: &[DeferredCommand],
    progress: &ProgressBar,
    settings: &ExecutionSettings,
    deps: &Mutex<&mut DependencyStore>,
    record_dependencies: bool,
) -> bool {
    let depfile = DependencyStore::worker_depfile_path(settings.layout, 0);
    let quoted_depfile = quote_path(&depfile);
    let mut successful = true;

    for command in commands {
        progress.inc(1);
        let (command_line, uses_depfile) = if record_dependencies {
            replace_first(&command.command, DEPS_FILE_PLACEHOLDER, &quoted_depfile)
        } else {
            (command.command.clone(), false)
        };

        if settings.verbose {
            progress.suspend(|| {
                println!(
                    "Running {}/{}: {}",
                    progress.position(),
                    progress.length().unwrap_or(0),
                    command_line
                );
            });
        }

        let command_successful = progress.suspend(|| exec::execute_command_passthrough(&command_line));
        if command_successful {
            if record_dependencies {
                let dependencies = if uses_depfile {
                    DependencyStore::read_compiler_depfile(&depfile)
                } else {
                    command.source_file.iter().cloned().collect()
                };
                record(deps, settings.layout, command, dependencies);
            }
        } else {
            successful = false;
        }
    }
    successful
}

fn record(
    deps: &Mutex<&mut DependencyStore>,
    layout: &TempLayout,
    command: &DeferredCommand,
    dependencies: Vec<PathBuf>,
) {
    let Some(destination) = &command.destination_file else {
        return;
    };
    deps.lock()
        .expect("dependency store poisoned")
        .set_dependencies(layout, command.package_id, destination, dependencies);
}
