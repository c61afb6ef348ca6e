use crate::error::{DepError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Points in a run where user hook commands execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    BeforeScan,
    AfterScan,
    BeforeUpdate,
    AfterUpdate,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeScan => "before_scan",
            HookStage::AfterScan => "after_scan",
            HookStage::BeforeUpdate => "before_update",
            HookStage::AfterUpdate => "after_update",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HookRunnerAgent executes user shell commands inside the cloned repository
pub struct HookRunnerAgent {
    working_dir: PathBuf,
}

impl HookRunnerAgent {
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Runs `commands` in order; the first non-zero exit aborts the stage.
    pub fn run_stage(&self, stage: HookStage, commands: &[String]) -> Result<()> {
        for command in commands {
            tracing::info!(stage = %stage, command = %command, "running hook");
            let output = self.execute_shell(command).map_err(|e| {
                DepError::Hook(format!("Failed to start hook in stage '{stage}': {e}"))
            })?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stdout.trim().is_empty() {
                tracing::info!(stage = %stage, "hook stdout: {}", stdout.trim());
            }
            if !stderr.trim().is_empty() {
                tracing::info!(stage = %stage, "hook stderr: {}", stderr.trim());
            }

            if !output.status.success() {
                let code = output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                return Err(DepError::Hook(format!(
                    "Hook command failed in stage '{stage}' with exit code {code}: {command}"
                )));
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    fn execute_shell(&self, command: &str) -> std::io::Result<Output> {
        Command::new("cmd")
            .args(["/C", command])
            .current_dir(&self.working_dir)
            .output()
    }

    #[cfg(not(windows))]
    fn execute_shell(&self, command: &str) -> std::io::Result<Output> {
        Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.working_dir)
            .output()
    }
}
