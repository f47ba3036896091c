//! External command transforms.
//!
//! The module content is written to the process's stdin and its stdout
//! becomes the new content. A non-zero exit rejects the module.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use super::{Transform, TransformError, TransformOutput};
use crate::config::CommandTransformConfig;

/// A transform backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    id: String,
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl CommandTransform {
    /// Create a command transform.
    pub fn new(id: &str, program: &str, args: Vec<String>) -> Self {
        Self { id: id.to_string(), program: program.to_string(), args, env: BTreeMap::new() }
    }

    /// Build from a `[transforms.<id>]` entry.
    pub fn from_config(id: &str, config: &CommandTransformConfig) -> Self {
        Self {
            id: id.to_string(),
            program: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }

    /// Arguments with `{file}` and `{dir}` expanded for `path`.
    fn expand_args(&self, path: &Path) -> Vec<String> {
        let file = path.to_string_lossy();
        let dir = path.parent().map(|d| d.to_string_lossy().into_owned()).unwrap_or_default();
        self.args.iter().map(|arg| arg.replace("{file}", &file).replace("{dir}", &dir)).collect()
    }
}

impl Transform for CommandTransform {
    fn name(&self) -> &str {
        &self.id
    }

    fn apply(&self, content: Vec<u8>, path: &Path) -> Result<TransformOutput, TransformError> {
        let args = self.expand_args(path);
        debug!(program = %self.program, ?args, "spawning transform process");

        let spawn_error =
            |source| TransformError::Spawn { program: self.program.clone(), source };

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = path.parent().filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(spawn_error)?;

        // Feed stdin from another thread so a full stdout pipe cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                // A process that exits without reading stdin closes the pipe; its
                // exit status decides the outcome.
                let _ = stdin.write_all(&content);
            })
        });

        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            if !stderr.is_empty() {
                debug!(stderr = %stderr, "transform stderr");
            }
            return Err(TransformError::Exit {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!(program = %self.program, stderr = %stderr, "transform wrote to stderr");
        }

        Ok(TransformOutput::content(output.stdout))
    }
}
