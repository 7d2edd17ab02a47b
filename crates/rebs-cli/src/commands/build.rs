//! The build action: plan every input package and drain the command
//! queue.

use super::update;
use rebs_build::{BuildContext, ExecutionSettings, Planner};

pub fn run(ctx: &mut BuildContext, update_third_party: bool) -> bool {
    if !update::run(ctx, update_third_party) {
        return false;
    }

    let mut planner = Planner::new();
    if !planner.build_packages(ctx) {
        return false;
    }
    execute(ctx, planner)
}

/// Drains a planner's queue against the context.
pub fn execute(ctx: &mut BuildContext, planner: Planner) -> bool {
    let queue = planner.into_queue();
    let settings = ExecutionSettings {
        layout: &ctx.layout,
        parallel_tasks: ctx.config.parallel_tasks,
        verbose: ctx.verbose,
    };
    queue.run_all(&settings, &mut ctx.deps)
}
