//! Resolve command: show where a reference lands and how it is transformed

use std::path::Path;
use std::process::ExitCode;

use super::build::load_for_command;
use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::BuildContext;
use crate::resolve::{Resolution, Resolver};
use crate::rules::RuleMatcher;

/// Run the resolve command
pub fn run_resolve(reference: &str, from: Option<&Path>, config: Option<&Path>) -> ExitCode {
    let loaded = match load_for_command(config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let context = BuildContext::from_loaded(loaded);

    let resolver = Resolver::from_config(context.config(), context.project_root());
    let from_dir = match from {
        Some(dir) => context.resolve_path(dir),
        None => context.src_dir(),
    };

    let rules = match RuleMatcher::from_config(context.config()) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("Error: invalid rule pattern: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match resolver.resolve(reference, &from_dir) {
        Ok(Resolution::External(global)) => {
            println!("{} -> external (global '{}')", reference, global);
            ExitCode::from(EXIT_SUCCESS)
        }
        Ok(Resolution::Module(resolved)) => {
            let matched = rules.match_path(&resolved.path);
            println!("{} -> {}", reference, resolved.path.display());
            println!("  kind: {}", resolved.kind);
            match matched.rule {
                Some(rule) => println!(
                    "  rule: #{} ({}) chain: {}",
                    rule.index,
                    rule.pattern.source(),
                    rule.chain.join(" <- ")
                ),
                None => println!("  rule: none (passed through)"),
            }
            for shadowed in rules.matching_rules(&resolved.path).iter().skip(1) {
                println!("  shadowed: #{} ({})", shadowed.index, shadowed.pattern.source());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
