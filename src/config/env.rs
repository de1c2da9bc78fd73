//! Environment variable overrides for configuration.
//!
//! Credentials can be kept out of the config file:
//! - `WOW_ACCOUNT` - account name
//! - `WOW_PASSWORD` - account password
//! - `WOW_CHARACTER` - character name
//!
//! Overrides only apply to values the file leaves empty.

use std::env;

use crate::config::types::Config;

/// Apply environment variable overrides to a config.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if config.wow.account.is_empty() {
        if let Ok(account) = env::var("WOW_ACCOUNT") {
            if !account.is_empty() {
                config.wow.account = account;
            }
        }
    }

    if config.wow.password.is_empty() {
        if let Ok(password) = env::var("WOW_PASSWORD") {
            if !password.is_empty() {
                config.wow.password = password;
            }
        }
    }

    if config.wow.character.is_empty() {
        if let Ok(character) = env::var("WOW_CHARACTER") {
            if !character.is_empty() {
                config.wow.character = character;
            }
        }
    }

    config
}

/// Config file path: the single positional argument, default
/// `herald.conf` in the working directory.
pub fn config_path_from_args() -> String {
    env::args().nth(1).unwrap_or_else(|| "herald.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ChatConfig, GuildEventsConfig, WowConfig};

    fn make_test_config(account: &str) -> Config {
        Config {
            wow: WowConfig {
                version: "3.3.5".to_string(),
                realm_build: None,
                game_build: None,
                realmlist: "localhost".to_string(),
                realm: "Test".to_string(),
                account: account.to_string(),
                password: "secret".to_string(),
                character: "Herald".to_string(),
                locale: "enUS".to_string(),
                platform: "Mac".to_string(),
                enable_server_motd: true,
            },
            guild: GuildEventsConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    #[test]
    fn env_only_fills_empty_values() {
        env::set_var("WOW_ACCOUNT", "FROMENV");

        let result = apply_env_overrides(make_test_config("fromfile"));
        assert_eq!(result.wow.account, "fromfile");

        let result = apply_env_overrides(make_test_config(""));
        assert_eq!(result.wow.account, "FROMENV");

        env::remove_var("WOW_ACCOUNT");
    }
}
