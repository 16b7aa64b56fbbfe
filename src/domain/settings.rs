//! Global switches the admin can toggle.

use serde::{Deserialize, Serialize};

/// Singleton settings row, created with defaults on first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub registration_enabled: bool,
    pub consultations_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registration_enabled: true,
            consultations_enabled: true,
        }
    }
}

/// Partial update for the settings row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub registration_enabled: Option<bool>,
    pub consultations_enabled: Option<bool>,
}

impl Settings {
    pub fn merged(self, patch: SettingsPatch) -> Self {
        Self {
            registration_enabled: patch
                .registration_enabled
                .unwrap_or(self.registration_enabled),
            consultations_enabled: patch
                .consultations_enabled
                .unwrap_or(self.consultations_enabled),
        }
    }
}
