//! Producer that runs an external program

use anyhow::{bail, Context, Result};
use refillcache::{Arg, Producer};
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Runs `program [fixed args] [key args]` once per refill
pub struct CommandProducer {
    name: String,
    program: String,
    fixed_args: Vec<String>,
}

impl CommandProducer {
    /// The producer is named after the program's file name
    pub fn new(program: impl Into<String>, fixed_args: Vec<String>) -> Self {
        let program = program.into();
        let name = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());

        Self {
            name,
            program,
            fixed_args,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Producer for CommandProducer {
    type Value = Value;

    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&self, args: &[Arg]) -> Result<Vec<Value>> {
        let output = Command::new(&self.program)
            .args(&self.fixed_args)
            .args(args.iter().map(Arg::to_string))
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.program, output.status, stderr.trim());
        }

        let values = parse_output(&String::from_utf8_lossy(&output.stdout));
        debug!(program = %self.program, values = values.len(), "Producer output parsed");
        Ok(values)
    }
}

/// A JSON array on stdout yields its elements; anything else is read as one
/// value per non-empty line, JSON where it parses and plain text otherwise.
fn parse_output(stdout: &str) -> Vec<Value> {
    if let Ok(Value::Array(values)) = serde_json::from_str(stdout.trim()) {
        return values;
    }

    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string())))
        .collect()
}
