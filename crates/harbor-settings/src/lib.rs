//! # harbor-settings
//!
//! Configuration management with layered sources for Harbor.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HarborSettings::default()`]
//! 2. **User file**: `~/.harbor/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HARBOR_*` overrides (highest priority)
//!
//! Explicit query options always win over anything loaded here.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton, initialized on first access.
static SETTINGS: OnceLock<HarborSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.harbor/settings.json` with env var
/// overrides. If loading fails, compiled defaults are used.
pub fn get_settings() -> &'static HarborSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            HarborSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: HarborSettings) -> std::result::Result<(), HarborSettings> {
    SETTINGS.set(settings)
}

/// Install the global tracing subscriber described by `settings.logging`.
pub fn init_logging(settings: &HarborSettings) {
    let logging = &settings.logging;
    if logging.json {
        harbor_core::logging::init_json_subscriber(&logging.level);
    } else {
        harbor_core::logging::init_subscriber(&logging.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_repeatable() {
        let mut settings = HarborSettings::default();
        init_logging(&settings);
        settings.logging.json = true;
        init_logging(&settings);
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = HarborSettings::default();
        assert_eq!(settings.query.max_turns, 10);
        assert!(settings.query.model.is_none());
        assert_eq!(settings.sandbox.timeout_ms, 600_000);
        assert_eq!(settings.sandbox.cli_binary, "claude");
        assert!(settings.snapshot.auto_snapshot);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn get_settings_is_stable() {
        let a = get_settings() as *const HarborSettings;
        let b = get_settings() as *const HarborSettings;
        assert_eq!(a, b);
    }
}
