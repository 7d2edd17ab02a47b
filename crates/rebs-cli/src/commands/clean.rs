//! Scratch-tree cleanup.

use rebs_build::layout::delete_folder_if_exists;
use rebs_build::BuildContext;

/// Deletes the current optimization level's scratch tree.
pub fn clean(ctx: &BuildContext) {
    delete_folder_if_exists(ctx.layout.current());
}

/// Deletes the whole scratch root, cached repositories included.
pub fn deep_clean(ctx: &BuildContext) {
    delete_folder_if_exists(ctx.layout.root());
}
