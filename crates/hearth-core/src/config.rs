//! Engine configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the engine can run with zero
//! configuration.

use std::str::FromStr;

use hearth_shared::constants::{
    MAX_AVATAR_BYTES, MAX_COMMIT_RETRIES, MAX_DISPLAY_NAME_LEN, MAX_GROUP_NAME_LEN,
    MAX_MESSAGE_LEN,
};

/// Engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum message length in characters.
    /// Env: `HEARTH_MAX_MESSAGE_LEN`
    /// Default: `4000`
    pub max_message_len: usize,

    /// Maximum group chat name length in characters.
    /// Env: `HEARTH_MAX_GROUP_NAME_LEN`
    /// Default: `64`
    pub max_group_name_len: usize,

    /// Maximum display name length in characters.
    /// Env: `HEARTH_MAX_DISPLAY_NAME_LEN`
    /// Default: `32`
    pub max_display_name_len: usize,

    /// Maximum avatar size in bytes.
    /// Env: `HEARTH_MAX_AVATAR_BYTES`
    /// Default: 2 MiB
    pub max_avatar_bytes: usize,

    /// How many times a command is re-validated after losing a commit race
    /// before giving up with a conflict.
    /// Env: `HEARTH_MAX_COMMIT_RETRIES`
    /// Default: `3`
    pub max_commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
            max_group_name_len: MAX_GROUP_NAME_LEN,
            max_display_name_len: MAX_DISPLAY_NAME_LEN,
            max_avatar_bytes: MAX_AVATAR_BYTES,
            max_commit_retries: MAX_COMMIT_RETRIES,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_with(&lookup, "HEARTH_MAX_MESSAGE_LEN", &mut config.max_message_len);
        override_with(&lookup, "HEARTH_MAX_GROUP_NAME_LEN", &mut config.max_group_name_len);
        override_with(
            &lookup,
            "HEARTH_MAX_DISPLAY_NAME_LEN",
            &mut config.max_display_name_len,
        );
        override_with(&lookup, "HEARTH_MAX_AVATAR_BYTES", &mut config.max_avatar_bytes);
        override_with(&lookup, "HEARTH_MAX_COMMIT_RETRIES", &mut config.max_commit_retries);

        config
    }
}

fn override_with<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr + std::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => {
            tracing::warn!(key, value = %raw, default = ?slot, "Invalid setting, using default");
        }
    }
}
