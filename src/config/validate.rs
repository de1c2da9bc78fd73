//! Configuration validation.
//!
//! Collects every problem into one error message instead of failing
//! on the first.

use crate::common::error::ConfigError;
use crate::common::types::ChatType;
use crate::config::types::{build_from_version, Config, Expansion};

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.wow.account.is_empty() {
        errors.push("wow.account is required (set in config or use WOW_ACCOUNT env var)".to_string());
    } else if !config.wow.account.is_ascii() {
        errors.push("wow.account must be ASCII".to_string());
    }

    if config.wow.password.is_empty() {
        errors.push("wow.password is required (set in config or use WOW_PASSWORD env var)".to_string());
    }

    if config.wow.character.is_empty() {
        errors.push(
            "wow.character is required (set in config or use WOW_CHARACTER env var)".to_string(),
        );
    } else if config.wow.character.len() < 2 || config.wow.character.len() > 12 {
        errors.push(format!(
            "wow.character must be 2-12 characters (got {})",
            config.wow.character.len()
        ));
    }

    if config.wow.realmlist.is_empty() {
        errors.push("wow.realmlist is required".to_string());
    }
    if config.wow.realm.is_empty() {
        errors.push("wow.realm is required".to_string());
    }

    if let Err(e) = Expansion::from_version(&config.wow.version) {
        errors.push(e.to_string());
    } else if config.wow.realm_build.is_none() || config.wow.game_build.is_none() {
        // Without an override the build must come from the version table.
        if let Err(e) = build_from_version(&config.wow.version) {
            errors.push(e.to_string());
        }
    }

    if config.wow.locale.len() != 4 {
        errors.push(format!(
            "wow.locale must be 4 characters, e.g. enUS (got '{}')",
            config.wow.locale
        ));
    }

    for (i, mapping) in config.chat.channels.iter().enumerate() {
        if ChatType::from_config_name(&mapping.channel_type).is_none() {
            errors.push(format!(
                "chat.channels[{}].type '{}' is invalid (use: Say, Guild, Officer, Yell, Emote, System, Whisper, Channel)",
                i, mapping.channel_type
            ));
        }

        if mapping.channel_type.eq_ignore_ascii_case("channel") && mapping.channel.is_none() {
            errors.push(format!(
                "chat.channels[{}].channel is required when type is 'Channel'",
                i
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ChannelMapping, ChatConfig, GuildEventsConfig, WowConfig};

    fn make_valid_config() -> Config {
        Config {
            wow: WowConfig {
                version: "3.3.5".to_string(),
                realm_build: None,
                game_build: None,
                realmlist: "logon.example.com".to_string(),
                realm: "Test Realm".to_string(),
                account: "tester".to_string(),
                password: "secret".to_string(),
                character: "Herald".to_string(),
                locale: "enUS".to_string(),
                platform: "Mac".to_string(),
                enable_server_motd: true,
            },
            guild: GuildEventsConfig::default(),
            chat: ChatConfig {
                channels: vec![ChannelMapping {
                    channel_type: "Guild".to_string(),
                    channel: None,
                    format: Some("[%user]: %message".to_string()),
                }],
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn empty_account_fails() {
        let mut config = make_valid_config();
        config.wow.account = String::new();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("wow.account"));
    }

    #[test]
    fn short_character_name_fails() {
        let mut config = make_valid_config();
        config.wow.character = "A".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("2-12 characters"));
    }

    #[test]
    fn unsupported_version_fails() {
        let mut config = make_valid_config();
        config.wow.version = "6.2.0".to_string();

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not supported"));
    }

    #[test]
    fn custom_channel_without_name_fails() {
        let mut config = make_valid_config();
        config.chat.channels.push(ChannelMapping {
            channel_type: "Channel".to_string(),
            channel: None,
            format: None,
        });

        let result = validate_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("chat.channels[1]"));
    }

    #[test]
    fn multiple_problems_are_collected() {
        let mut config = make_valid_config();
        config.wow.account = String::new();
        config.wow.realm = String::new();

        let message = validate_config(&config).unwrap_err().to_string();
        assert!(message.contains("wow.account"));
        assert!(message.contains("wow.realm"));
    }
}
