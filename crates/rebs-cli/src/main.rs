use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rebs_build::{BuildContext, InvocationInputs, OptLevel, TempLayout};
use rebs_config::{Evaluator, GlobalConfig};

mod commands;

#[derive(Parser)]
#[command(name = "rebs")]
#[command(about = "A ridiculously easy build system for C/C++ packages", long_about = None)]
#[command(version)]
struct Cli {
    /// Packages to operate on: short names, or paths starting with '.' or
    /// '/'. Defaults to the working directory.
    packages: Vec<String>,

    /// Apply the action to all known packages
    #[arg(long)]
    all: bool,

    /// Print every command being run and its output
    #[arg(long)]
    verbose: bool,

    /// Build but don't run
    #[arg(long)]
    build: bool,

    /// Build and run the packages (default)
    #[arg(long)]
    run: bool,

    /// Build and run unit tests for the packages
    #[arg(long)]
    test: bool,

    /// Clean the temp files for the current optimization level
    #[arg(long)]
    clean: bool,

    /// Clean all temp files and cached repositories
    #[arg(long = "deep-clean")]
    deep_clean: bool,

    /// List all known packages with their names and paths
    #[arg(long)]
    list: bool,

    /// Generate clangd files for the packages
    #[arg(long = "generate-clangd")]
    generate_clangd: bool,

    /// Update third party packages; combines with other actions
    #[arg(long)]
    update: bool,

    /// Build with all debug symbols
    #[arg(long)]
    debug: bool,

    /// Build quickly with some optimizations (default)
    #[arg(long)]
    fast: bool,

    /// Build with all optimizations enabled
    #[arg(long)]
    optimized: bool,

    /// Target operating system passed to the configuration evaluator
    #[arg(long)]
    os: Option<String>,

    /// Target architecture passed to the configuration evaluator
    #[arg(long)]
    arch: Option<String>,

    /// Shell completion: command name, current word, previous word
    #[arg(long, num_args = 3, value_names = ["CMD", "CUR", "PREV"], allow_hyphen_values = true)]
    complete: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Build,
    Run,
    Test,
    Clean,
    DeepClean,
    List,
    GenerateClangd,
    Complete,
    UpdateThirdParty,
}

impl Cli {
    fn action(&self) -> Action {
        if self.complete.is_some() {
            Action::Complete
        } else if self.build {
            Action::Build
        } else if self.clean {
            Action::Clean
        } else if self.deep_clean {
            Action::DeepClean
        } else if self.test {
            Action::Test
        } else if self.list {
            Action::List
        } else if self.generate_clangd {
            Action::GenerateClangd
        } else if self.run {
            Action::Run
        } else if self.update {
            // A bare --update only updates third party packages.
            Action::UpdateThirdParty
        } else {
            Action::Run
        }
    }

    fn optimization_level(&self) -> OptLevel {
        if self.debug {
            OptLevel::Debug
        } else if self.optimized {
            OptLevel::Optimized
        } else {
            OptLevel::Fast
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let is_parse_error = error.use_stderr();
            let _ = error.print();
            // Help and version are successful exits; parse failures are
            // not.
            std::process::exit(if is_parse_error { -1 } else { 0 });
        }
    };

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(-1),
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            std::process::exit(-1);
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let action = cli.action();

    // Flag completion needs no configuration; answer before touching the
    // evaluator so completion works on broken setups too.
    if action == Action::Complete {
        let words = cli.complete.as_deref().unwrap_or(&[]);
        if commands::complete::complete_flags(words) {
            return Ok(true);
        }
    }

    let working_dir = std::env::current_dir()?;
    let universe_root = rebs_config::is_universe_root(&working_dir);
    let level = cli.optimization_level();
    let layout = TempLayout::new(level, &working_dir, universe_root);

    let target_os = cli.os.clone().unwrap_or_else(|| std::env::consts::OS.to_string());
    let target_arch = cli
        .arch
        .clone()
        .unwrap_or_else(|| std::env::consts::ARCH.to_string());

    let mut evaluator = Evaluator::new(
        layout.current().to_path_buf(),
        level.name(),
        &target_os,
        &target_arch,
    );
    let (global_value, _) = evaluator.load_global(&working_dir)?;
    let config = GlobalConfig::from_value(global_value);

    let inputs = InvocationInputs {
        packages: cli.packages.clone(),
        all_packages: cli.all,
        universe_root,
    };
    let mut ctx = BuildContext::new(
        layout,
        config,
        Box::new(evaluator),
        inputs,
        working_dir,
        cli.verbose,
    );

    let successful = match action {
        Action::List => {
            commands::list::run(&ctx);
            true
        }
        Action::Clean => {
            commands::clean::clean(&ctx);
            return Ok(true);
        }
        Action::DeepClean => {
            commands::clean::deep_clean(&ctx);
            return Ok(true);
        }
        Action::Complete => {
            let words = cli.complete.as_deref().unwrap_or(&[]);
            commands::complete::complete_packages(&ctx, words);
            true
        }
        Action::GenerateClangd => commands::clangd::run(&mut ctx),
        Action::Test => {
            eprintln!("Testing is not implemented.");
            false
        }
        Action::UpdateThirdParty => commands::update::run(&mut ctx, true),
        Action::Build => commands::build::run(&mut ctx, cli.update),
        Action::Run => commands::run::run(&mut ctx, cli.update),
    };

    ctx.flush();
    Ok(successful)
}
