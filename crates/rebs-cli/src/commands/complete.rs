//! Shell completion helper, driven as `rebs --complete <cmd> <cur>
//! <prev>` from the shell's completion function.

use rebs_build::BuildContext;

/// Every flag rebs accepts, for completion.
const KNOWN_FLAGS: &[&str] = &[
    "--all",
    "--arch",
    "--build",
    "--clean",
    "--debug",
    "--deep-clean",
    "--fast",
    "--generate-clangd",
    "--help",
    "--list",
    "--optimized",
    "--os",
    "--run",
    "--test",
    "--update",
    "--verbose",
];

/// The word being completed: the second of the three completion
/// arguments.
fn current_word(words: &[String]) -> &str {
    words.get(1).map(String::as_str).unwrap_or("")
}

/// Completes flag words. Returns whether the word was a flag (and was
/// handled); package-name completion needs the registry and is handled
/// separately.
pub fn complete_flags(words: &[String]) -> bool {
    let current = current_word(words);
    if !current.starts_with('-') {
        return false;
    }
    for flag in KNOWN_FLAGS {
        if flag.starts_with(current) {
            println!("{flag}");
        }
    }
    true
}

/// Completes package names against the registry.
pub fn complete_packages(ctx: &BuildContext, words: &[String]) {
    let current = current_word(words);
    for (name, _) in ctx.registry.known_packages() {
        if name.starts_with(current) {
            println!("{name}");
        }
    }
}
