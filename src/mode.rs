//! Update modes and where fixtures get them from.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Run-wide policy for writing call records.
///
/// Serialized with the same text as [`fmt::Display`] and the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Replay only; a missing or mismatched record fails the call.
    #[serde(rename = "none")]
    None,
    /// Record calls that have no record yet.
    #[serde(rename = "new", alias = "create")]
    Create,
    /// Record missing calls and re-record mismatched ones.
    #[serde(rename = "all", alias = "create_and_update")]
    CreateAndUpdate,
}

impl UpdateMode {
    pub const fn allows_create(self) -> bool {
        matches!(self, Self::Create | Self::CreateAndUpdate)
    }

    pub const fn allows_update(self) -> bool {
        matches!(self, Self::CreateAndUpdate)
    }

    /// Canonical textual form, as accepted by the environment.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Create => "new",
            Self::CreateAndUpdate => "all",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "new" | "create" => Ok(Self::Create),
            "all" | "create_and_update" => Ok(Self::CreateAndUpdate),
            _ => Err(Error::InvalidMode {
                value: value.to_string(),
            }),
        }
    }
}

/// Source of the active update mode.
///
/// Fixtures ask once per call, at the point of the decision, so a provider
/// may change its answer mid-run.
pub trait ModeProvider: Send + Sync {
    fn current_mode(&self) -> Result<UpdateMode>;
}

impl ModeProvider for UpdateMode {
    fn current_mode(&self) -> Result<UpdateMode> {
        Ok(*self)
    }
}

impl<F> ModeProvider for F
where
    F: Fn() -> Result<UpdateMode> + Send + Sync,
{
    fn current_mode(&self) -> Result<UpdateMode> {
        self()
    }
}

/// Reads the mode from the environment on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModeProvider;

impl ModeProvider for EnvModeProvider {
    fn current_mode(&self) -> Result<UpdateMode> {
        RunConfig::from_env().update_mode()
    }
}

/// A mode that can be switched while fixtures are live.
#[derive(Debug, Clone)]
pub struct SharedMode {
    inner: Arc<RwLock<UpdateMode>>,
}

impl SharedMode {
    pub fn new(mode: UpdateMode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(mode)),
        }
    }

    pub fn set(&self, mode: UpdateMode) {
        match self.inner.write() {
            Ok(mut guard) => *guard = mode,
            Err(poisoned) => *poisoned.into_inner() = mode,
        }
    }

    pub fn get(&self) -> UpdateMode {
        match self.inner.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl ModeProvider for SharedMode {
    fn current_mode(&self) -> Result<UpdateMode> {
        Ok(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_textual_modes() {
        assert_eq!("none".parse::<UpdateMode>().unwrap(), UpdateMode::None);
        assert_eq!("new".parse::<UpdateMode>().unwrap(), UpdateMode::Create);
        assert_eq!("ALL".parse::<UpdateMode>().unwrap(), UpdateMode::CreateAndUpdate);
        assert_eq!(
            " create_and_update ".parse::<UpdateMode>().unwrap(),
            UpdateMode::CreateAndUpdate
        );
        let err = "sometimes".parse::<UpdateMode>().unwrap_err();
        assert!(matches!(err, Error::InvalidMode { ref value } if value == "sometimes"));
    }

    #[test]
    fn display_round_trips() {
        for mode in [UpdateMode::None, UpdateMode::Create, UpdateMode::CreateAndUpdate] {
            assert_eq!(mode.to_string().parse::<UpdateMode>().unwrap(), mode);
        }
    }

    #[test]
    fn serde_uses_the_display_text() {
        for mode in [UpdateMode::None, UpdateMode::Create, UpdateMode::CreateAndUpdate] {
            let encoded = serde_json::to_value(mode).unwrap();
            assert_eq!(encoded, serde_json::Value::String(mode.to_string()));
            assert_eq!(serde_json::from_value::<UpdateMode>(encoded).unwrap(), mode);
        }
        let legacy: UpdateMode = serde_json::from_str("\"create_and_update\"").unwrap();
        assert_eq!(legacy, UpdateMode::CreateAndUpdate);
    }

    #[test]
    fn permissions() {
        assert!(!UpdateMode::None.allows_create());
        assert!(UpdateMode::Create.allows_create());
        assert!(!UpdateMode::Create.allows_update());
        assert!(UpdateMode::CreateAndUpdate.allows_update());
    }

    #[test]
    fn shared_mode_changes_are_visible() {
        let shared = SharedMode::new(UpdateMode::None);
        let provider: Box<dyn ModeProvider> = Box::new(shared.clone());
        assert_eq!(provider.current_mode().unwrap(), UpdateMode::None);
        shared.set(UpdateMode::CreateAndUpdate);
        assert_eq!(provider.current_mode().unwrap(), UpdateMode::CreateAndUpdate);
    }

    #[test]
    fn closures_are_providers() {
        let provider = || -> Result<UpdateMode> { Ok(UpdateMode::Create) };
        assert_eq!(provider.current_mode().unwrap(), UpdateMode::Create);
    }
}
