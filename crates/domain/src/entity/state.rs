//! Entity state — the current operational state of an entity.

use serde::{Deserialize, Serialize};

/// Discrete operational state of an entity.
///
/// Climate entities report `on`/`off` from the unit's power flag; the HVAC
/// mode itself lives in the `hvac_mode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    On,
    Off,
    #[default]
    Unknown,
    Unavailable,
}

impl EntityState {
    /// Map a boolean power/switch flag to [`On`](Self::On) / [`Off`](Self::Off).
    #[must_use]
    pub fn from_flag(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    /// Whether the entity is reachable (anything but [`Unavailable`](Self::Unavailable)).
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Unknown => f.write_str("unknown"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_flag_to_on_off() {
        assert_eq!(EntityState::from_flag(true), EntityState::On);
        assert_eq!(EntityState::from_flag(false), EntityState::Off);
    }

    #[test]
    fn should_report_unavailable_when_state_is_unavailable() {
        assert!(!EntityState::Unavailable.is_available());
        assert!(EntityState::Unknown.is_available());
    }

    #[test]
    fn should_default_to_unknown() {
        assert_eq!(EntityState::default(), EntityState::Unknown);
    }

    #[test]
    fn should_serialize_lowercase() {
        let json = serde_json::to_string(&EntityState::Unavailable).unwrap();
        assert_eq!(json, "\"unavailable\"");
        assert_eq!(EntityState::On.to_string(), "on");
    }
}
