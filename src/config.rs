//! Ambient run configuration.
//!
//! Fixtures resolve their defaults from the environment:
//!
//! | variable | meaning | default |
//! |---|---|---|
//! | `CALLFIX_UPDATE_MODE` | `none`, `new` or `all` | `none` under CI, else `new` |
//! | `CALLFIX_RECORDS_DIR` | records folder | `tests/fixtures/calls` |
//! | `CALLFIX_ONE_UPDATE_PER_RUN` | cap overwrites at one per run | off |
//! | `CI` | marks a CI run | unset |

use crate::error::Result;
use crate::mode::UpdateMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

pub const ENV_UPDATE_MODE: &str = "CALLFIX_UPDATE_MODE";
pub const ENV_RECORDS_DIR: &str = "CALLFIX_RECORDS_DIR";
pub const ENV_ONE_UPDATE_PER_RUN: &str = "CALLFIX_ONE_UPDATE_PER_RUN";
pub const ENV_CI: &str = "CI";
pub const DEFAULT_RECORDS_DIR: &str = "tests/fixtures/calls";

/// In-process overrides consulted before the real environment, so tests can
/// vary the configuration without touching process-global state.
#[cfg(test)]
fn env_overrides() -> &'static Mutex<HashMap<String, String>> {
    static OVERRIDES: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    OVERRIDES.get_or_init(Mutex::default)
}

fn env_var(name: &str) -> Option<String> {
    #[cfg(test)]
    {
        let overrides = env_overrides()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(value) = overrides.get(name) {
            return Some(value.clone());
        }
    }
    std::env::var(name).ok()
}

/// Sets (`Some`) or clears (`None`) an override, returning the one it replaced.
#[cfg(test)]
pub(crate) fn swap_env_override(name: &str, value: Option<&str>) -> Option<String> {
    let mut overrides = env_overrides()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    match value {
        Some(value) => overrides.insert(name.to_string(), value.to_string()),
        None => overrides.remove(name),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Snapshot of the ambient configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Raw mode text; validated by [`RunConfig::update_mode`].
    pub update_mode: Option<String>,
    pub records_dir: Option<PathBuf>,
    pub one_update_per_run: Option<bool>,
    pub ci: bool,
}

impl RunConfig {
    pub fn from_env() -> Self {
        Self {
            update_mode: env_var(ENV_UPDATE_MODE).filter(|value| !value.trim().is_empty()),
            records_dir: env_var(ENV_RECORDS_DIR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
            one_update_per_run: env_var(ENV_ONE_UPDATE_PER_RUN).map(|value| is_truthy(&value)),
            ci: env_var(ENV_CI).is_some_and(|value| is_truthy(&value)),
        }
    }

    /// The configured mode, or the CI-dependent default.
    pub fn update_mode(&self) -> Result<UpdateMode> {
        match &self.update_mode {
            Some(value) => value.parse(),
            None if self.ci => Ok(UpdateMode::None),
            None => Ok(UpdateMode::Create),
        }
    }

    pub fn records_dir(&self) -> PathBuf {
        self.records_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDS_DIR))
    }

    pub fn one_update_per_run(&self) -> bool {
        self.one_update_per_run.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Applies overrides for its lifetime, restoring the previous ones on drop.
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(name, value)| (*name, swap_env_override(name, *value)))
                .collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, previous) in self.saved.drain(..).rev() {
                swap_env_override(name, previous.as_deref());
            }
        }
    }

    #[test]
    fn defaults_without_ci() {
        let config = RunConfig {
            ci: false,
            ..RunConfig::default()
        };
        assert_eq!(config.update_mode().unwrap(), UpdateMode::Create);
        assert_eq!(config.records_dir(), PathBuf::from(DEFAULT_RECORDS_DIR));
        assert!(!config.one_update_per_run());
    }

    #[test]
    fn ci_defaults_to_replay_only() {
        let config = RunConfig {
            ci: true,
            ..RunConfig::default()
        };
        assert_eq!(config.update_mode().unwrap(), UpdateMode::None);
    }

    #[test]
    fn reads_overrides() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _env = EnvGuard::set(&[
            (ENV_UPDATE_MODE, Some("all")),
            (ENV_RECORDS_DIR, Some("/tmp/records")),
            (ENV_ONE_UPDATE_PER_RUN, Some("yes")),
            (ENV_CI, Some("true")),
        ]);
        let config = RunConfig::from_env();
        assert!(config.ci);
        assert_eq!(config.update_mode().unwrap(), UpdateMode::CreateAndUpdate);
        assert_eq!(config.records_dir(), PathBuf::from("/tmp/records"));
        assert!(config.one_update_per_run());
    }

    #[test]
    fn invalid_mode_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let _env = EnvGuard::set(&[(ENV_UPDATE_MODE, Some("everything"))]);
        let err = RunConfig::from_env().update_mode().unwrap_err();
        assert!(matches!(err, Error::InvalidMode { .. }));
    }

    #[test]
    fn env_provider_rereads_each_call() {
        use crate::mode::{EnvModeProvider, ModeProvider};

        let _lock = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let provider = EnvModeProvider;
        {
            let _env = EnvGuard::set(&[(ENV_UPDATE_MODE, Some("none"))]);
            assert_eq!(provider.current_mode().unwrap(), UpdateMode::None);
        }
        let _env = EnvGuard::set(&[(ENV_UPDATE_MODE, Some("new"))]);
        assert_eq!(provider.current_mode().unwrap(), UpdateMode::Create);
    }
}
