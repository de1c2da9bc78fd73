//! Guild notification rendering against the configured policy.

use crate::common::types::GuildEventKind;
use crate::config::types::{GuildEventsConfig, GuildNotificationConfig};

/// Render a guild event with its configured format, or `None` when
/// the event kind is disabled.
pub fn format_guild_event(
    config: &GuildEventsConfig,
    kind: GuildEventKind,
    user: &str,
    target: Option<&str>,
    rank: Option<&str>,
    message: Option<&str>,
) -> Option<String> {
    let policy = policy_for(config, kind);
    if !policy.enabled {
        return None;
    }

    Some(
        policy
            .format
            .replace("%user", user)
            .replace("%target", target.unwrap_or(""))
            .replace("%rank", rank.unwrap_or(""))
            .replace("%message", message.unwrap_or("")),
    )
}

fn policy_for(config: &GuildEventsConfig, kind: GuildEventKind) -> &GuildNotificationConfig {
    match kind {
        GuildEventKind::Promoted => &config.promoted,
        GuildEventKind::Demoted => &config.demoted,
        GuildEventKind::Motd => &config.motd,
        GuildEventKind::Joined => &config.joined,
        GuildEventKind::Left => &config.left,
        GuildEventKind::Removed => &config.removed,
        GuildEventKind::Online => &config.online,
        GuildEventKind::Offline => &config.offline,
    }
}
