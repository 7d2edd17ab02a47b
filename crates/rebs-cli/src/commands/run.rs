//! The run action: build the input packages, then run each application
//! (or the configured global run command).

use super::{build, update};
use rebs_build::{BuildContext, Planner};

pub fn run(ctx: &mut BuildContext, update_third_party: bool) -> bool {
    if !update::run(ctx, update_third_party) {
        return false;
    }

    let mut planner = Planner::new();
    if !planner.build_packages(ctx) {
        return false;
    }
    if let Err(error) = planner.run_packages(ctx) {
        eprintln!("{error}.");
        return false;
    }
    build::execute(ctx, planner)
}
