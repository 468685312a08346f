//! livedm - live-room message relay
//!
//! Joins one live room's push stream, classifies its messages into domain
//! events, archives revenue events and logs everything it sees.

mod config;

use config::Config;
use livedm_client::Session;
use livedm_core::{ArchivedEvent, DomainEvent, EventRelay, EventSink, GiftCatalog, JsonlSink};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if LIVEDM_CONFIG is set, then env overrides)
    let config_path = std::env::var("LIVEDM_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting livedm relay");
    tracing::info!("  Server: {}", config.room.server_url);
    tracing::info!(
        "  Room: {} (owner uid {})",
        config.room.room_id,
        config.room.owner_uid
    );
    if config.room.uid == 0 {
        tracing::info!("  Viewer: anonymous");
    } else {
        tracing::info!("  Viewer: uid {}", config.room.uid);
    }

    // Gift catalog
    let catalog = match &config.catalog.path {
        Some(path) => match GiftCatalog::from_file(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("Failed to load gift catalog: {}", e);
                return Err(e.into());
            }
        },
        None => {
            tracing::info!("  Gift catalog: none");
            GiftCatalog::new()
        }
    };

    // Event archive
    let sink: Option<Arc<dyn EventSink>> = if config.archive.enabled {
        let archive = JsonlSink::open(&config.archive.dir)?;
        tracing::info!("  Archive directory: {}", archive.dir().display());
        if config.archive.replay_on_start {
            let cached = archive.replay(config.room.room_id)?;
            log_replay_summary(&cached);
        }
        Some(Arc::new(archive))
    } else {
        tracing::info!("  Archive: disabled");
        None
    };

    let session = Session::new(config.session_config());
    let relay = EventRelay::with_parts(config.room.room_id, catalog, sink);
    let _events = relay.on_event(|event| {
        log_event(event);
        Ok(())
    });
    let _packets = relay.attach(&session);

    // Log connection state changes
    let mut states = session.watch_state();
    let state_log = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!("Connection {}", state);
        }
    });

    session.connect(config.session.auto_reconnect).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, disconnecting...");
    session.disconnect().await;

    drop(session);
    let _ = state_log.await;

    tracing::info!("Relay stopped");
    Ok(())
}

fn log_replay_summary(entries: &[ArchivedEvent]) {
    if entries.is_empty() {
        tracing::info!("  Archive: empty");
        return;
    }

    let gifts = entries
        .iter()
        .filter(|e| matches!(e.event, DomainEvent::Gift(_)))
        .count();
    let memberships = entries
        .iter()
        .filter(|e| matches!(e.event, DomainEvent::Membership(_)))
        .count();
    let super_chats = entries
        .iter()
        .filter(|e| matches!(e.event, DomainEvent::SuperChat(_)))
        .count();
    tracing::info!(
        "  Archive: {} gifts, {} memberships, {} super chats",
        gifts,
        memberships,
        super_chats
    );
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::Chat(chat) => tracing::info!("[chat] {}: {}", chat.uname, chat.text),
        DomainEvent::Gift(gift) => tracing::info!(
            "[gift] {} {} {} x{}",
            gift.uname,
            gift.action,
            gift.gift_name,
            gift.num
        ),
        DomainEvent::Membership(m) => tracing::info!(
            "[membership] {} bought {} x{}",
            m.uname,
            m.gift_name,
            m.num
        ),
        DomainEvent::SuperChat(sc) => {
            tracing::info!("[super chat] {} ({}): {}", sc.uname, sc.price, sc.message)
        }
        DomainEvent::Interaction(i) => {
            tracing::debug!("[interaction] {} {}", i.uname, i.kind.as_str())
        }
        DomainEvent::EntryEffect(e) => tracing::debug!("[entry] {}", e.copy_writing),
        DomainEvent::ViewerCount(v) => tracing::debug!("[viewers] {} ({:?})", v.count, v.source),
        DomainEvent::RoomStats(s) => {
            tracing::debug!("[stats] {} followers, {} fan club", s.followers, s.fans_club)
        }
    }
}
