//! Persistent CLI settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use amd_core::session::{HOOK_ON_HUMAN, HOOK_ON_MACHINE, HOOK_ON_NOT_SURE};
use amd_core::{AmdParams, ConfigDiagnostic};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_FRAME_MS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Global defaults every call starts from.
    pub amd: AmdParams,
    /// Per-call override string, same syntax as the application argument.
    pub call_args: String,
    /// Length of the frames cut from each recording.
    pub frame_ms: u32,
    pub on_machine: Option<String>,
    pub on_human: Option<String>,
    pub on_not_sure: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            amd: AmdParams::default(),
            call_args: String::new(),
            frame_ms: DEFAULT_FRAME_MS,
            on_machine: None,
            on_human: None,
            on_not_sure: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) -> Vec<ConfigDiagnostic> {
        let diagnostics = self.amd.normalize();
        self.call_args = self.call_args.trim().to_string();
        self.frame_ms = if self.frame_ms == 0 {
            DEFAULT_FRAME_MS
        } else {
            self.frame_ms.min(1_000)
        };
        for hook in [&mut self.on_machine, &mut self.on_human, &mut self.on_not_sure] {
            *hook = hook
                .as_ref()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty());
        }
        diagnostics
    }

    /// Channel variables that carry the configured hooks.
    pub fn hook_variables(&self) -> Vec<(&'static str, &str)> {
        [
            (HOOK_ON_MACHINE, &self.on_machine),
            (HOOK_ON_HUMAN, &self.on_human),
            (HOOK_ON_NOT_SURE, &self.on_not_sure),
        ]
        .into_iter()
        .filter_map(|(name, hook)| hook.as_deref().map(|h| (name, h)))
        .collect()
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("AMD")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("amd")
            .join("settings.json")
    }
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!("ignoring settings file {}: {e}", path.display());
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    for diagnostic in settings.normalize() {
        warn!("settings: {diagnostic}");
    }
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("amd-settings-{}-{name}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"amd":{"greeting":2000},"onHuman":"transfer 1000"}"#)
                .expect("parse");
        assert_eq!(settings.amd.greeting, 2_000);
        assert_eq!(settings.amd.initial_silence, 2_500);
        assert_eq!(settings.frame_ms, DEFAULT_FRAME_MS);
        assert_eq!(settings.on_human.as_deref(), Some("transfer 1000"));
    }

    #[test]
    fn normalize_resets_zero_values_and_blank_hooks() {
        let mut settings = AppSettings {
            amd: AmdParams {
                greeting: 0,
                total_analysis_time: 0,
                ..AmdParams::default()
            },
            frame_ms: 0,
            on_machine: Some("   ".into()),
            on_human: Some(" transfer 1000 ".into()),
            ..AppSettings::default()
        };
        let diagnostics = settings.normalize();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(settings.amd.greeting, 1_500);
        assert_eq!(settings.amd.total_analysis_time, 0);
        assert_eq!(settings.frame_ms, DEFAULT_FRAME_MS);
        assert_eq!(settings.on_machine, None);
        assert_eq!(settings.on_human.as_deref(), Some("transfer 1000"));
    }

    #[test]
    fn hook_variables_skip_unset_hooks() {
        let settings = AppSettings {
            on_machine: Some("hangup".into()),
            on_not_sure: Some("playback::/tmp/beep.wav".into()),
            ..AppSettings::default()
        };
        assert_eq!(
            settings.hook_variables(),
            vec![
                (HOOK_ON_MACHINE, "hangup"),
                (HOOK_ON_NOT_SURE, "playback::/tmp/beep.wav"),
            ]
        );
    }

    #[test]
    fn missing_file_loads_defaults() {
        let settings = load_settings(&temp_path("missing"));
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let path = temp_path("saved");
        let settings = AppSettings {
            call_args: "^^:greeting=1800".into(),
            frame_ms: 30,
            on_machine: Some("hangup".into()),
            ..AppSettings::default()
        };
        save_settings(&path, &settings).expect("save");
        let loaded = load_settings(&path);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
        assert_eq!(loaded, settings);
    }
}
