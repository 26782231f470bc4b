//! Post-verdict application hooks.
//!
//! After a verdict the channel variable named by [`hook_variable`] is read,
//! variable-expanded and parsed into a [`HookCommand`]:
//!
//! ```text
//! "transfer 1000 XML default"   app=transfer  arg="1000 XML default"
//! "set:amd_seen=true"           app=set       arg="amd_seen=true"
//! "perl::/scripts/notify.pl"    app=perl      arg=/scripts/notify.pl  (background)
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::CallChannel;
use crate::detector::AmdResult;

pub const HOOK_ON_MACHINE: &str = "mod_amd_on_machine";
pub const HOOK_ON_HUMAN: &str = "mod_amd_on_human";
pub const HOOK_ON_NOT_SURE: &str = "mod_amd_on_not_sure";

/// Channel variable holding the hook for `result`. CANCEL has none.
pub fn hook_variable(result: AmdResult) -> Option<&'static str> {
    match result {
        AmdResult::Machine => Some(HOOK_ON_MACHINE),
        AmdResult::Human => Some(HOOK_ON_HUMAN),
        AmdResult::NotSure => Some(HOOK_ON_NOT_SURE),
        AmdResult::Cancel => None,
    }
}

/// One application invocation requested by a hook variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookCommand {
    pub application: String,
    pub argument: Option<String>,
    /// Run without blocking the call's media thread.
    pub background: bool,
}

impl HookCommand {
    /// Parse `app[ arg]`, `app[:arg]` or `app::arg` (background).
    ///
    /// Applications whose name starts with `perl` always run in the
    /// background. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let input = raw.trim();
        if input.is_empty() {
            return None;
        }

        let mut application = input;
        let mut argument = None;
        let mut background = false;

        for (i, c) in input.char_indices() {
            match c {
                ' ' => {
                    application = &input[..i];
                    argument = Some(&input[i + 1..]);
                    break;
                }
                ':' if input[i + 1..].starts_with(':') => {
                    application = &input[..i];
                    argument = Some(&input[i + 2..]);
                    background = true;
                    break;
                }
                ':' => {
                    application = &input[..i];
                    argument = Some(&input[i + 1..]);
                    break;
                }
                _ => {}
            }
        }

        if application
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("perl"))
        {
            background = true;
        }

        Some(Self {
            application: application.to_string(),
            argument: argument
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            background,
        })
    }
}

/// Look up, expand and execute the hook for `result`.
pub(crate) fn dispatch<C: CallChannel + ?Sized>(
    channel: &mut C,
    result: AmdResult,
) -> Option<HookCommand> {
    let variable = hook_variable(result)?;
    let Some(raw) = channel.variable(variable) else {
        debug!(channel = channel.name(), variable, "no hook configured");
        return None;
    };
    let expanded = channel.expand_variables(&raw);
    let command = HookCommand::parse(&expanded)?;

    info!(
        channel = channel.name(),
        variable,
        application = %command.application,
        background = command.background,
        "executing AMD hook"
    );
    channel.execute(&command);
    Some(command)
}
