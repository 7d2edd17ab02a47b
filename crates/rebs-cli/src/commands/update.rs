//! Third-party vendoring before and instead of builds.

use rebs_build::BuildContext;
use rebs_vendor::RepositoryRegistry;

/// Refreshes third-party packages for every input package. When `force` is
/// false, packages only update if they have a vendoring description but no
/// produced-files record yet.
pub fn run(ctx: &mut BuildContext, force: bool) -> bool {
    let mut registry = RepositoryRegistry::load(ctx.layout.root());
    let mut successful = true;

    for package_path in ctx.registry.input_packages(&ctx.inputs, &ctx.working_dir) {
        let result = if force {
            rebs_vendor::update_third_party(&package_path, &mut registry)
        } else {
            rebs_vendor::maybe_update_before_building(&package_path, &mut registry, false)
        };
        if let Err(error) = result {
            eprintln!("{error}");
            successful = false;
        }
    }

    registry.flush();
    successful
}
