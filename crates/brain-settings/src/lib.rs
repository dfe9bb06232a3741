//! # brain-settings
//!
//! Configuration for the brain hub, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BrainSettings::default()`]
//! 2. **Settings file**: `~/.brain/settings.json` or an explicit path, deep-merged over defaults
//! 3. **Environment variables**: `BRAIN_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, read_settings, settings_path,
};
pub use types::*;
