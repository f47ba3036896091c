//! Build command implementations (build, check, init)

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::debug;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, BuildPipeline};
use crate::config::{load_config, merge_cli_overrides, CliOverrides, LoadedConfig, OutputMode};
use crate::error::BuildError;

/// Load the configuration for a command, printing the error on failure.
pub(crate) fn load_for_command(config: Option<&Path>) -> Result<LoadedConfig, ExitCode> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match load_config(config, &cwd) {
        Ok(loaded) => {
            match &loaded.path {
                Some(path) => debug!(config = %path.display(), "using config"),
                None => {
                    debug!(root = %loaded.root.display(), "no packline.toml found, using defaults")
                }
            }
            Ok(loaded)
        }
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            Err(ExitCode::from(EXIT_ERROR))
        }
    }
}

/// Print a build error with its component and file.
fn report_error(error: &BuildError) {
    eprintln!("Build failed [{}]: {}", error.component(), error);
    if let Some(file) = error.file() {
        eprintln!("  file: {}", file.display());
    }
    if let BuildError::EmitFailure { written, .. } = error {
        eprintln!("  output directory is incomplete ({} artifact(s) written)", written);
    }
}

/// Run the build command
pub fn run_build(
    config: Option<&Path>,
    out: Option<&Path>,
    mode: Option<OutputMode>,
    jobs: Option<usize>,
    dry_run: bool,
    json: bool,
) -> ExitCode {
    let mut loaded = match load_for_command(config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let overrides = CliOverrides { out: out.map(Path::to_path_buf), mode, jobs };
    merge_cli_overrides(&mut loaded.config, &overrides);

    let context = BuildContext::from_loaded(loaded).with_dry_run(dry_run);
    match BuildPipeline::new(context).run() {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error serializing report: {}", e);
                        return ExitCode::from(EXIT_ERROR);
                    }
                }
            } else {
                println!("{}", report.summary());
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            report_error(&e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the check command: every build phase, nothing written.
pub fn run_check(config: Option<&Path>) -> ExitCode {
    let loaded = match load_for_command(config) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let label = loaded.source_label();

    let context = BuildContext::from_loaded(loaded).with_dry_run(true);
    match BuildPipeline::new(context).run() {
        Ok(report) => {
            println!(
                "{}: ok ({} modules, {} artifacts)",
                label.display(),
                report.modules.len(),
                report.artifacts.len()
            );
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            report_error(&e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the init command
pub fn run_init(path: Option<&Path>, name: Option<&str>, preset: &str) -> ExitCode {
    use crate::init::{init_project, scaffold_files, InitError};

    let project_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let project_name = name
        .map(|n| n.to_string())
        .or_else(|| project_path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "my-app".to_string());

    match init_project(&project_path, &project_name, preset) {
        Ok(preset) => {
            println!("Created packline project '{}' at {}", project_name, project_path.display());
            println!();
            println!("Files:");
            for (rel, _) in scaffold_files(preset, &project_name) {
                println!("  {}", rel);
            }
            println!();
            println!("Next steps:");
            println!("  cd {}", project_path.display());
            println!("  packline build");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(InitError::DirectoryExists(dir)) => {
            eprintln!("Error: Directory '{}' already exists and is not empty", dir);
            eprintln!("Use an empty directory or specify a different path");
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
