//! # livedm-core
//!
//! Domain layer for livedm.
//!
//! This crate provides:
//! - Classification of push payloads into typed events
//! - Gift catalog enrichment
//! - The append-only event archive
//! - The relay that ties a session to a domain event handler

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod event;
pub mod relay;
pub mod sink;

pub use catalog::{GiftCatalog, GiftInfo};
pub use classifier::{classify, command};
pub use error::CoreError;
pub use event::{
    ChatMessage, CoinType, DomainEvent, EntryEffectEvent, GiftEvent, GuardLevel,
    InteractionEvent, InteractionKind, Medal, MembershipEvent, RoomStats, SuperChatEvent,
    ViewerCount, ViewerCountSource,
};
pub use relay::EventRelay;
pub use sink::{ArchivedEvent, EventSink, JsonlSink, MemorySink};
