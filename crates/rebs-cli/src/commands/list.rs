//! Lists every known package.

use rebs_build::BuildContext;

pub fn run(ctx: &BuildContext) {
    println!("All known packages:");
    for (name, path) in ctx.registry.known_packages() {
        println!(" {name}: {}", path.display());
    }
}
