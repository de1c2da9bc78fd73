//! Configuration type definitions.

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wow: WowConfig,
    #[serde(default)]
    pub guild: GuildEventsConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Game connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WowConfig {
    /// Dotted client version, e.g. "3.3.5".
    #[serde(default = "default_version")]
    pub version: String,
    /// Build override for the realm leg.
    pub realm_build: Option<u16>,
    /// Build override for the world leg.
    pub game_build: Option<u16>,
    /// Realm server address, "host" or "host:port" (port defaults to 3724).
    #[serde(default)]
    pub realmlist: String,
    /// Realm name to select from the realm list (case-insensitive).
    #[serde(default)]
    pub realm: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub character: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[serde(default = "default_true")]
    pub enable_server_motd: bool,
}

fn default_version() -> String {
    "3.3.5".to_string()
}

fn default_locale() -> String {
    "enUS".to_string()
}

fn default_platform() -> String {
    "Mac".to_string()
}

fn default_true() -> bool {
    true
}

/// Per-event guild notification policy.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildNotificationConfig {
    pub enabled: bool,
    pub format: String,
}

/// Guild notification policy with the stock defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuildEventsConfig {
    pub promoted: GuildNotificationConfig,
    pub demoted: GuildNotificationConfig,
    pub online: GuildNotificationConfig,
    pub offline: GuildNotificationConfig,
    pub joined: GuildNotificationConfig,
    pub left: GuildNotificationConfig,
    pub removed: GuildNotificationConfig,
    pub motd: GuildNotificationConfig,
}

impl Default for GuildEventsConfig {
    fn default() -> Self {
        let on = |format: &str| GuildNotificationConfig {
            enabled: true,
            format: format.to_string(),
        };
        let off = |format: &str| GuildNotificationConfig {
            enabled: false,
            format: format.to_string(),
        };
        Self {
            promoted: on("%user has promoted %target to %rank."),
            demoted: on("%user has demoted %target to %rank."),
            online: off("%user has come online."),
            offline: off("%user has gone offline."),
            joined: on("%user has joined the guild."),
            left: on("%user has left the guild."),
            removed: on("%target has been kicked out of the guild by %user."),
            motd: on("Guild Message of the Day: %message"),
        }
    }
}

/// Chat routing declarations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub channels: Vec<ChannelMapping>,
}

/// One routed chat lane.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMapping {
    /// Chat type name: "Guild", "Officer", "Say", "Yell", "Emote",
    /// "System", "Whisper", or "Channel".
    #[serde(rename = "type")]
    pub channel_type: String,
    /// Custom channel name, required when `type` is "Channel".
    pub channel: Option<String>,
    /// Format string with %user/%message placeholders.
    pub format: Option<String>,
}

impl Config {
    /// Realm host and port from the realmlist string.
    pub fn realm_host_port(&self) -> (String, u16) {
        match self.wow.realmlist.split_once(':') {
            Some((host, port)) => {
                let port = port.parse().unwrap_or(3724);
                (host.to_string(), port)
            }
            None => (self.wow.realmlist.clone(), 3724),
        }
    }

    /// Custom channel names the session should join after login.
    pub fn channels_to_join(&self) -> Vec<String> {
        self.chat
            .channels
            .iter()
            .filter(|m| m.channel_type.eq_ignore_ascii_case("channel"))
            .filter_map(|m| m.channel.clone())
            .collect()
    }
}

/// Client platform reported during logon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Mac,
}

impl Platform {
    pub fn from_config(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "win" | "windows" => Self::Windows,
            _ => Self::Mac,
        }
    }

    /// The 3-byte tag sent in the logon challenge.
    pub fn tag(self) -> &'static [u8; 3] {
        match self {
            Self::Windows => b"Win",
            Self::Mac => b"OSX",
        }
    }
}

/// Protocol era, derived from the version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expansion {
    Vanilla,
    Tbc,
    Wotlk,
    Cataclysm,
    Mop,
}

impl Expansion {
    pub fn from_version(version: &str) -> Result<Self, ConfigError> {
        if version.starts_with("1.") {
            return Ok(Self::Vanilla);
        }
        if version.starts_with("2.") {
            return Ok(Self::Tbc);
        }
        if version.starts_with("3.") {
            return Ok(Self::Wotlk);
        }
        match version {
            "4.3.4" => Ok(Self::Cataclysm),
            "5.4.8" => Ok(Self::Mop),
            _ => Err(ConfigError::InvalidValue {
                field: "wow.version".to_string(),
                message: format!("Version {version} not supported!"),
            }),
        }
    }

    /// WotLK and later use the RC4 header cipher and the extended
    /// server header; earlier eras use the additive-XOR cipher.
    pub fn uses_rc4_header_cipher(self) -> bool {
        self >= Self::Wotlk
    }
}

/// Build number for a supported version string.
pub fn build_from_version(version: &str) -> Result<u16, ConfigError> {
    let build = match version {
        "1.6.1" => 4544,
        "1.6.2" => 4565,
        "1.6.3" => 4620,
        "1.7.1" => 4695,
        "1.8.4" => 4878,
        "1.9.4" => 5086,
        "1.10.2" => 5302,
        "1.11.2" => 5464,
        "1.12.1" => 5875,
        "1.12.2" => 6005,
        "1.12.3" => 6141,
        "2.4.3" => 8606,
        "3.2.2" => 10505,
        "3.3.0" => 11159,
        "3.3.2" => 11403,
        "3.3.3" => 11723,
        "3.3.5" => 12340,
        "4.3.4" => 15595,
        "5.4.8" => 18414,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "wow.version".to_string(),
                message: format!("Build {other} not supported!"),
            })
        }
    };
    Ok(build)
}

/// Everything the two protocol legs need to identify the client,
/// derived once from the validated configuration.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Upper-cased ASCII account, as hashed by SRP6.
    pub account: Vec<u8>,
    pub password: String,
    pub character: String,
    pub realm_name: String,
    pub version: [u8; 3],
    pub realm_build: u16,
    pub game_build: u16,
    pub locale: [u8; 4],
    pub platform: Platform,
    pub expansion: Expansion,
}

impl ClientIdentity {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let wow = &config.wow;
        let expansion = Expansion::from_version(&wow.version)?;

        let mut parts = wow.version.split('.').map(|p| p.parse::<u8>());
        let mut version = [0u8; 3];
        for octet in version.iter_mut() {
            *octet = parts
                .next()
                .and_then(|p| p.ok())
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "wow.version".to_string(),
                    message: format!("'{}' is not a dotted triple", wow.version),
                })?;
        }

        let default_build = build_from_version(&wow.version)?;
        let mut locale = [0u8; 4];
        let locale_bytes = wow.locale.as_bytes();
        if locale_bytes.len() != 4 {
            return Err(ConfigError::InvalidValue {
                field: "wow.locale".to_string(),
                message: format!("'{}' is not a 4-character locale", wow.locale),
            });
        }
        locale.copy_from_slice(locale_bytes);

        Ok(Self {
            account: wow.account.to_ascii_uppercase().into_bytes(),
            password: wow.password.clone(),
            character: wow.character.clone(),
            realm_name: wow.realm.clone(),
            version,
            realm_build: wow.realm_build.unwrap_or(default_build),
            game_build: wow.game_build.unwrap_or(default_build),
            locale,
            platform: Platform::from_config(&wow.platform),
            expansion,
        })
    }
}
