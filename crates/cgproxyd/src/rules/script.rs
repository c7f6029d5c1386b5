//! Rule backend that shells out to the TPROXY script.

use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use cgproxy_config::ProxyConfig;

use super::{RULES_TARGET, RuleAction, RuleBackend, RuleError};

const SHELL: &str = "sh";
const STOP_ARGUMENT: &str = "stop";

/// Runs the rule script through `sh`.
///
/// Installs pass the snapshot as environment variables; removals call the
/// script with a single `stop` argument.
#[derive(Debug, Clone)]
pub struct ScriptRuleBackend {
    script: Utf8PathBuf,
}

impl ScriptRuleBackend {
    /// Builds a backend for the given script path.
    pub fn new(script: impl Into<Utf8PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Script invoked for each rule change.
    #[must_use]
    pub fn script(&self) -> &Utf8Path {
        &self.script
    }

    fn run(&self, action: RuleAction, command: &mut Command) -> Result<(), RuleError> {
        debug!(target: RULES_TARGET, script = %self.script, %action, "running rule script");
        let output = command
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RuleError::Spawn {
                program: self.script.to_string(),
                action,
                source,
            })?;
        if output.status.success() {
            return Ok(());
        }
        Err(RuleError::Exited {
            action,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }

    fn command(&self) -> Command {
        let mut command = Command::new(SHELL);
        command.arg(self.script.as_std_path());
        command
    }
}

impl RuleBackend for ScriptRuleBackend {
    fn install(&self, config: &ProxyConfig) -> Result<(), RuleError> {
        let mut command = self.command();
        command.envs(config.rule_environment());
        self.run(RuleAction::Install, &mut command)
    }

    fn remove(&self) -> Result<(), RuleError> {
        let mut command = self.command();
        command.arg(STOP_ARGUMENT);
        self.run(RuleAction::Remove, &mut command)
    }
}
