//! Typed domain events produced from push payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paid membership tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardLevel {
    #[default]
    None,
    /// Tier 1, the most expensive.
    Governor,
    Admiral,
    /// Tier 3, the entry tier.
    Captain,
}

impl GuardLevel {
    /// Maps the wire code (0-3) to a tier. Unknown codes map to `None`.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => GuardLevel::Governor,
            2 => GuardLevel::Admiral,
            3 => GuardLevel::Captain,
            _ => GuardLevel::None,
        }
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, GuardLevel::None)
    }
}

/// Fan medal worn by a chatting viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medal {
    pub level: u32,
    pub name: String,
    /// Streamer the medal belongs to.
    pub anchor_uname: String,
    pub anchor_room_id: u64,
}

/// A chat line (`DANMU_MSG`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub uid: u64,
    pub uname: String,
    pub text: String,
    /// 24-bit RGB.
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medal: Option<Medal>,
    pub user_level: u32,
    pub guard_level: GuardLevel,
    pub is_admin: bool,
    /// Set when the message is a sticker rather than text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoticon_url: Option<String>,
}

/// Currency a gift was paid with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinType {
    /// Paid currency.
    Gold,
    /// Free currency.
    #[default]
    Silver,
}

impl CoinType {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("gold") {
            CoinType::Gold
        } else {
            CoinType::Silver
        }
    }
}

/// A gift (`SEND_GIFT`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftEvent {
    pub uid: u64,
    pub uname: String,
    pub gift_id: u64,
    /// Empty when the payload omitted it and no catalog entry exists.
    pub gift_name: String,
    pub num: u32,
    /// Price of one unit, in the coin type's smallest unit.
    pub price: u64,
    pub coin_type: CoinType,
    pub total_coin: u64,
    /// Verb shown before the gift name, e.g. "feeds".
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl GiftEvent {
    /// Total value of the gift; falls back to `price * num` when the
    /// payload did not carry a total.
    pub fn value(&self) -> u64 {
        if self.total_coin > 0 {
            self.total_coin
        } else {
            self.price.saturating_mul(u64::from(self.num))
        }
    }
}

/// A membership purchase (`GUARD_BUY`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub uid: u64,
    pub uname: String,
    pub guard_level: GuardLevel,
    /// Number of months bought.
    pub num: u32,
    pub price: u64,
    pub gift_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A paid pinned message (`SUPER_CHAT_MESSAGE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperChatEvent {
    pub id: u64,
    pub uid: u64,
    pub uname: String,
    pub message: String,
    /// Price in whole currency units.
    pub price: u64,
    /// How long the message stays pinned, in seconds.
    pub duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Enter,
    Follow,
    Share,
    SpecialFollow,
    MutualFollow,
}

impl InteractionKind {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(InteractionKind::Enter),
            2 => Some(InteractionKind::Follow),
            3 => Some(InteractionKind::Share),
            4 => Some(InteractionKind::SpecialFollow),
            5 => Some(InteractionKind::MutualFollow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Enter => "entered",
            InteractionKind::Follow => "followed",
            InteractionKind::Share => "shared",
            InteractionKind::SpecialFollow => "special-followed",
            InteractionKind::MutualFollow => "mutual-followed",
        }
    }
}

/// A viewer action (`INTERACT_WORD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub uid: u64,
    pub uname: String,
    pub kind: InteractionKind,
}

/// Member entrance banner (`ENTRY_EFFECT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEffectEvent {
    pub uid: u64,
    /// Banner text with the name markers removed.
    pub copy_writing: String,
    pub privilege_type: u8,
}

/// Where a viewer count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerCountSource {
    /// Heartbeat reply popularity value.
    Heartbeat,
    /// `ONLINE_RANK_COUNT`.
    OnlineRank,
    /// `WATCHED_CHANGE`.
    Watched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCount {
    pub count: u64,
    pub source: ViewerCountSource,
}

/// Follower statistics (`ROOM_REAL_TIME_MESSAGE_UPDATE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStats {
    pub room_id: u64,
    pub followers: u64,
    pub fans_club: u64,
}

/// A classified push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Chat(ChatMessage),
    Gift(GiftEvent),
    Membership(MembershipEvent),
    SuperChat(SuperChatEvent),
    Interaction(InteractionEvent),
    EntryEffect(EntryEffectEvent),
    ViewerCount(ViewerCount),
    RoomStats(RoomStats),
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::Chat(_) => "chat",
            DomainEvent::Gift(_) => "gift",
            DomainEvent::Membership(_) => "membership",
            DomainEvent::SuperChat(_) => "super_chat",
            DomainEvent::Interaction(_) => "interaction",
            DomainEvent::EntryEffect(_) => "entry_effect",
            DomainEvent::ViewerCount(_) => "viewer_count",
            DomainEvent::RoomStats(_) => "room_stats",
        }
    }

    /// Returns whether the event is revenue-bearing and should be archived.
    pub fn is_persistable(&self) -> bool {
        matches!(
            self,
            DomainEvent::Gift(_) | DomainEvent::Membership(_) | DomainEvent::SuperChat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_level_codes() {
        assert_eq!(GuardLevel::from_code(0), GuardLevel::None);
        assert_eq!(GuardLevel::from_code(1), GuardLevel::Governor);
        assert_eq!(GuardLevel::from_code(2), GuardLevel::Admiral);
        assert_eq!(GuardLevel::from_code(3), GuardLevel::Captain);
        assert_eq!(GuardLevel::from_code(9), GuardLevel::None);
        assert!(GuardLevel::Captain.is_member());
        assert!(!GuardLevel::None.is_member());
    }

    #[test]
    fn test_gift_value_fallback() {
        let mut gift = GiftEvent {
            uid: 1,
            uname: "alice".into(),
            gift_id: 31036,
            gift_name: "Flower".into(),
            num: 3,
            price: 100,
            coin_type: CoinType::Gold,
            total_coin: 0,
            action: "feeds".into(),
            face: None,
            icon: None,
            timestamp: None,
        };
        assert_eq!(gift.value(), 300);

        gift.total_coin = 250;
        assert_eq!(gift.value(), 250);
    }

    #[test]
    fn test_tagged_serialization() {
        let event = DomainEvent::ViewerCount(ViewerCount {
            count: 7,
            source: ViewerCountSource::OnlineRank,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "viewer_count", "count": 7, "source": "online_rank"})
        );

        let back: DomainEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_persistable_kinds() {
        let stats = DomainEvent::RoomStats(RoomStats {
            room_id: 1,
            followers: 2,
            fans_club: 3,
        });
        assert!(!stats.is_persistable());
        assert_eq!(CoinType::parse("GOLD"), CoinType::Gold);
        assert_eq!(CoinType::parse("silver"), CoinType::Silver);
    }
}
