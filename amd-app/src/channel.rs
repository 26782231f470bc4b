//! A recording played back as if it were a live call leg.

use std::collections::BTreeMap;
use std::path::Path;

use amd_core::{AmdEvent, CallChannel, HookCommand};
use tracing::{debug, info};

use crate::executor::HookExecutor;
use crate::settings::AppSettings;

/// Channel variable holding the recording path, usable in hooks as
/// `${amd_recording}`.
pub const VAR_RECORDING: &str = "amd_recording";

pub struct CliChannel {
    name: String,
    vars: BTreeMap<String, String>,
    executor: HookExecutor,
}

impl CliChannel {
    pub fn new(recording: &Path, settings: &AppSettings, executor: HookExecutor) -> Self {
        let name = recording
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| recording.display().to_string());
        let mut vars = BTreeMap::new();
        vars.insert(VAR_RECORDING.to_string(), recording.display().to_string());
        for (variable, hook) in settings.hook_variables() {
            vars.insert(variable.to_string(), hook.to_string());
        }
        Self {
            name,
            vars,
            executor,
        }
    }
}

impl CallChannel for CliChannel {
    fn name(&self) -> &str {
        &self.name
    }

    // A recording never hangs up.
    fn is_ready(&self) -> bool {
        true
    }

    fn media_up(&self) -> bool {
        true
    }

    fn variable(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        debug!(channel = %self.name, "set {name}={value}");
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn variables(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }

    fn fire_event(&mut self, event: &AmdEvent) {
        info!(
            channel = %self.name,
            result = %event.result,
            cause = %event.cause,
            "fired {}",
            event.name
        );
    }

    fn execute(&mut self, command: &HookCommand) {
        self.executor.execute(&self.name, command);
    }
}
