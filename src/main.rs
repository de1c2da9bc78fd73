//! Herald - headless WoW chat bridge core
//!
//! Logs a bot character into a legacy WoW realm and relays chat and
//! guild events over the bridge interface. Without a platform client
//! attached, bridge traffic is rendered to the log.

mod bridge;
mod common;
mod config;
mod game;
mod protocol;

use tokio::signal;
use tracing::{debug, error, info, warn};

use bridge::bridge_channels;
use common::messages::BridgeEvent;
use common::reconnect::ReconnectDelay;
use common::types::ChatType;
use config::types::{ClientIdentity, GuildEventsConfig};
use game::formatter::format_guild_event;
use game::GameClient;
use protocol::realm::connector::connect_and_authenticate;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Herald v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = config::env::config_path_from_args();
    info!("Loading configuration from {config_path}...");

    let config = match config::load_and_validate(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            error!("Please ensure {config_path} exists and is properly formatted.");
            std::process::exit(2);
        }
    };
    let identity = match ClientIdentity::from_config(&config) {
        Ok(identity) => identity,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Configuration loaded successfully");
    info!("  Account: {}", config.wow.account);
    info!("  Character: {}", config.wow.character);
    info!("  Realm: {}", config.wow.realm);
    info!("  Realmlist: {}", config.wow.realmlist);
    info!("  Version: {} ({:?})", config.wow.version, identity.expansion);

    let (channels, handle, mut events) = bridge_channels();

    // Headless host: render bridge traffic to the log.
    let guild_policy = config.guild.clone();
    let host_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render_event(&guild_policy, event);
        }
        debug!("Event stream closed");
    });

    // Signals trigger a graceful logout through the bridge.
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received - initiating graceful logout...");
        handle.shutdown();
        handle
    });

    let (realm_host, realm_port) = config.realm_host_port();
    let mut client = GameClient::new(config, identity.clone(), channels);
    let mut delay = ReconnectDelay::new();

    let exit_code = loop {
        if *client.channels.shutdown_rx.borrow() {
            break 0;
        }

        info!("Authenticating with realm server...");
        match connect_and_authenticate(&realm_host, realm_port, &identity).await {
            Ok(session) => {
                info!("Realm authentication successful!");
                delay.reset();
                match client.run(session).await {
                    Ok(()) => {
                        info!("Game client disconnected");
                        if *client.channels.shutdown_rx.borrow() {
                            break 0;
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        error!("Game client error: {e}");
                        break e.exit_code();
                    }
                    Err(e) => error!("Game client error: {e}"),
                }
            }
            Err(e) if e.is_fatal() => {
                error!("Realm authentication failed: {e}");
                break e.exit_code();
            }
            Err(e) => error!("Realm authentication failed: {e}"),
        }

        let wait = delay.next_delay();
        info!(
            "Reconnecting in {}s... (attempt {})",
            wait.as_secs(),
            delay.attempts()
        );
        client.idle_drain(wait).await;
    };

    host_task.abort();
    signal_task.abort();
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    info!("Exiting...");
}

fn render_event(guild_policy: &GuildEventsConfig, event: BridgeEvent) {
    match event {
        BridgeEvent::Connected { realm } => info!("Connected to {realm}"),
        BridgeEvent::Disconnected { reason } => warn!("Disconnected: {reason}"),
        BridgeEvent::Chat(message) => {
            let scope = match message.chat_type {
                ChatType::Channel => message.channel_name.clone().unwrap_or_default(),
                other => format!("{other:?}"),
            };
            info!("[{scope}] {}: {}", message.sender_name, message.content);
        }
        BridgeEvent::GuildEvent { kind, user, target, rank, message } => {
            if let Some(text) = format_guild_event(
                guild_policy,
                kind,
                &user,
                target.as_deref(),
                rank.as_deref(),
                message.as_deref(),
            ) {
                info!("[Guild] {text}");
            }
        }
        BridgeEvent::NameResolved { guid, name } => {
            debug!("Resolved {guid:#018X} -> {name}");
        }
        BridgeEvent::System { text } => info!("[Server] {text}"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
