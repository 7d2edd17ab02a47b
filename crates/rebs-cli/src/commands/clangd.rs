//! IDE assistance: writes a `.clangd` file per package with its
//! consolidated includes, defines, and the flags of its build commands.

use rebs_build::metadata::{metadata_for_package, PackageMetadata};
use rebs_build::registry::package_name_from_path;
use rebs_build::BuildContext;
use std::fmt::Write as _;

pub fn run(ctx: &mut BuildContext) -> bool {
    let mut successful = true;
    for package_path in ctx.registry.input_packages(&ctx.inputs, &ctx.working_dir) {
        let package_name = package_name_from_path(&package_path);
        if let Err(error) = maybe_generate_for_package(ctx, &package_name) {
            eprintln!("{error}");
            successful = false;
        }
    }
    successful
}

fn maybe_generate_for_package(
    ctx: &mut BuildContext,
    package_name: &str,
) -> rebs_build::BuildResult<()> {
    metadata_for_package(ctx, package_name)?;
    let metadata = ctx.metadata.get(package_name).unwrap();
    let clangd_path = metadata.package_path.join(".clangd");

    // Skip when up to date against the consolidated metadata.
    if ctx.timestamps.exists(&clangd_path)
        && ctx.timestamps.timestamp_of(&clangd_path) >= metadata.metadata_timestamp
    {
        return Ok(());
    }

    let cpp_command = build_command_for_extensions(metadata, &[".cc", ".cpp", ".cxx"]);
    let c_command = build_command_for_extensions(metadata, &[".c"]);

    // Prefer the C++ command as the default block, then C, then anything.
    let default_command = if !cpp_command.is_empty() {
        cpp_command.clone()
    } else if !c_command.is_empty() {
        c_command.clone()
    } else {
        metadata
            .build_commands_by_extension
            .values()
            .next()
            .cloned()
            .unwrap_or_default()
    };

    let mut contents = String::new();
    write_flags_block(
        &mut contents,
        &extract_flags(&default_command),
        &metadata.consolidated_includes,
        &metadata.consolidated_defines,
    );

    // Conditional C block when both languages are present; includes and
    // defines are inherited from the default block.
    if !cpp_command.is_empty() && !c_command.is_empty() {
        contents.push_str("---\nIf:\n  PathMatch: .*\\.c\n");
        write_flags_block(&mut contents, &extract_flags(&c_command), &[], &[]);
    }

    std::fs::write(&clangd_path, contents)
        .map_err(|error| rebs_build::BuildError::io(&clangd_path, error))?;
    ctx.timestamps.set_to_now(&clangd_path);
    Ok(())
}

fn build_command_for_extensions(metadata: &PackageMetadata, extensions: &[&str]) -> String {
    for extension in extensions {
        if let Some(command) = metadata.build_commands_by_extension.get(*extension) {
            return command.clone();
        }
    }
    String::new()
}

/// Pulls the `-` flags out of a build command, dropping the compiler
/// itself and any placeholder fragments.
fn extract_flags(command: &str) -> Vec<String> {
    command
        .split(' ')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| !segment.contains("${") && !segment.contains('}'))
        .filter(|segment| segment.starts_with('-'))
        .map(str::to_string)
        .collect()
}

fn write_flags_block(
    contents: &mut String,
    flags: &[String],
    includes: &[std::path::PathBuf],
    defines: &[String],
) {
    contents.push_str("CompileFlags:\n  Add: [\n");
    for include in includes {
        let absolute = std::path::absolute(include).unwrap_or_else(|_| include.clone());
        let _ = writeln!(contents, "    \"-I{}\",", absolute.display());
    }
    for define in defines {
        let _ = writeln!(contents, "    -D{define},");
    }
    for flag in flags {
        let _ = writeln!(contents, "    {flag},");
    }
    contents.push_str("  ]\n");
}
