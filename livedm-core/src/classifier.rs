//! Push payload classification.
//!
//! Every push message is a JSON object with a `cmd` tag. Each recognized tag
//! has exactly one extraction function below; positional payloads such as
//! `DANMU_MSG.info` are only ever indexed inside their extractor.

use crate::event::{
    ChatMessage, CoinType, DomainEvent, EntryEffectEvent, GiftEvent, GuardLevel,
    InteractionEvent, InteractionKind, Medal, MembershipEvent, RoomStats, SuperChatEvent,
    ViewerCount, ViewerCountSource,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// A required field absent from (or mistyped in) a recognized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MissingField(&'static str);

type Extracted = Result<DomainEvent, MissingField>;

/// Returns the message's `cmd` tag with any `:`-separated suffix removed.
///
/// `DANMU_MSG:4:0:2:2:2:0` yields `DANMU_MSG`.
pub fn command(message: &Value) -> Option<&str> {
    let cmd = message.get("cmd")?.as_str()?;
    Some(cmd.split(':').next().unwrap_or(cmd))
}

/// Maps one push payload to a domain event.
///
/// Unrecognized tags yield `None` and are logged at debug level; recognized
/// tags whose required fields are missing yield `None` with a warning.
pub fn classify(message: &Value) -> Option<DomainEvent> {
    let Some(cmd) = command(message) else {
        tracing::debug!("Ignoring payload without cmd");
        return None;
    };

    let extracted = match cmd {
        "DANMU_MSG" => chat(message),
        "SEND_GIFT" => gift(message),
        "GUARD_BUY" => membership(message),
        "SUPER_CHAT_MESSAGE" => super_chat(message),
        "INTERACT_WORD" => interaction(message),
        "ENTRY_EFFECT" => entry_effect(message),
        "ONLINE_RANK_COUNT" => online_rank_count(message),
        "WATCHED_CHANGE" => watched_change(message),
        "ROOM_REAL_TIME_MESSAGE_UPDATE" => room_stats(message),
        other => {
            tracing::debug!("Unhandled cmd {}", other);
            return None;
        }
    };

    match extracted {
        Ok(event) => Some(event),
        Err(MissingField(field)) => {
            tracing::warn!("Dropping {} payload: missing field {}", cmd, field);
            None
        }
    }
}

fn chat(message: &Value) -> Extracted {
    let text = required_str(message, "/info/1")?;
    let uid = required_u64(message, "/info/2/0")?;
    let uname = required_str(message, "/info/2/1")?;

    let medal = message
        .pointer("/info/3")
        .and_then(Value::as_array)
        .filter(|fields| !fields.is_empty())
        .and_then(|_| {
            Some(Medal {
                level: u32::try_from(lenient_u64(message.pointer("/info/3/0")?)?).ok()?,
                name: message.pointer("/info/3/1")?.as_str()?.to_string(),
                anchor_uname: optional_str(message, "/info/3/2").unwrap_or_default(),
                anchor_room_id: optional_u64(message, "/info/3/3").unwrap_or(0),
            })
        });

    Ok(DomainEvent::Chat(ChatMessage {
        uid,
        uname,
        text,
        color: narrow(optional_u64(message, "/info/0/3").unwrap_or(0xFFFFFF), "/info/0/3")?,
        timestamp: optional_u64(message, "/info/0/4").and_then(from_millis),
        medal,
        user_level: narrow(optional_u64(message, "/info/4/0").unwrap_or(0), "/info/4/0")?,
        guard_level: GuardLevel::from_code(optional_u64(message, "/info/7").unwrap_or(0)),
        is_admin: optional_u64(message, "/info/2/2").unwrap_or(0) == 1,
        emoticon_url: optional_str(message, "/info/0/13/url").filter(|url| !url.is_empty()),
    }))
}

fn gift(message: &Value) -> Extracted {
    Ok(DomainEvent::Gift(GiftEvent {
        uid: required_u64(message, "/data/uid")?,
        uname: required_str(message, "/data/uname")?,
        gift_id: required_u64(message, "/data/giftId")?,
        gift_name: optional_str(message, "/data/giftName").unwrap_or_default(),
        num: narrow(required_u64(message, "/data/num")?, "/data/num")?,
        price: optional_u64(message, "/data/price").unwrap_or(0),
        coin_type: optional_str(message, "/data/coin_type")
            .map(|s| CoinType::parse(&s))
            .unwrap_or_default(),
        total_coin: optional_u64(message, "/data/total_coin").unwrap_or(0),
        action: optional_str(message, "/data/action").unwrap_or_default(),
        face: optional_str(message, "/data/face"),
        icon: None,
        timestamp: optional_u64(message, "/data/timestamp").and_then(from_secs),
    }))
}

fn membership(message: &Value) -> Extracted {
    Ok(DomainEvent::Membership(MembershipEvent {
        uid: required_u64(message, "/data/uid")?,
        uname: required_str(message, "/data/username")?,
        guard_level: GuardLevel::from_code(required_u64(message, "/data/guard_level")?),
        num: narrow(optional_u64(message, "/data/num").unwrap_or(1), "/data/num")?,
        price: optional_u64(message, "/data/price").unwrap_or(0),
        gift_name: optional_str(message, "/data/gift_name").unwrap_or_default(),
        timestamp: optional_u64(message, "/data/start_time").and_then(from_secs),
    }))
}

fn super_chat(message: &Value) -> Extracted {
    Ok(DomainEvent::SuperChat(SuperChatEvent {
        id: required_u64(message, "/data/id")?,
        uid: required_u64(message, "/data/uid")?,
        uname: required_str(message, "/data/user_info/uname")?,
        message: required_str(message, "/data/message")?,
        price: required_u64(message, "/data/price")?,
        duration_secs: optional_u64(message, "/data/time").unwrap_or(0),
        start_time: optional_u64(message, "/data/start_time").and_then(from_secs),
    }))
}

fn interaction(message: &Value) -> Extracted {
    let code = required_u64(message, "/data/msg_type")?;
    let kind = InteractionKind::from_code(code).ok_or(MissingField("data/msg_type"))?;
    Ok(DomainEvent::Interaction(InteractionEvent {
        uid: required_u64(message, "/data/uid")?,
        uname: required_str(message, "/data/uname")?,
        kind,
    }))
}

fn entry_effect(message: &Value) -> Extracted {
    let copy_writing = required_str(message, "/data/copy_writing")?
        .replace("<%", "")
        .replace("%>", "");
    Ok(DomainEvent::EntryEffect(EntryEffectEvent {
        uid: required_u64(message, "/data/uid")?,
        copy_writing,
        privilege_type: narrow(
            optional_u64(message, "/data/privilege_type").unwrap_or(0),
            "/data/privilege_type",
        )?,
    }))
}

fn online_rank_count(message: &Value) -> Extracted {
    Ok(DomainEvent::ViewerCount(ViewerCount {
        count: required_u64(message, "/data/count")?,
        source: ViewerCountSource::OnlineRank,
    }))
}

fn watched_change(message: &Value) -> Extracted {
    Ok(DomainEvent::ViewerCount(ViewerCount {
        count: required_u64(message, "/data/num")?,
        source: ViewerCountSource::Watched,
    }))
}

fn room_stats(message: &Value) -> Extracted {
    Ok(DomainEvent::RoomStats(RoomStats {
        room_id: required_u64(message, "/data/roomid")?,
        followers: required_u64(message, "/data/fans")?,
        fans_club: optional_u64(message, "/data/fans_club").unwrap_or(0),
    }))
}

/// Strips the leading slash from a JSON pointer for log lines.
fn field_name(pointer: &'static str) -> &'static str {
    pointer.trim_start_matches('/')
}

fn required_u64(message: &Value, pointer: &'static str) -> Result<u64, MissingField> {
    optional_u64(message, pointer).ok_or(MissingField(field_name(pointer)))
}

fn required_str(message: &Value, pointer: &'static str) -> Result<String, MissingField> {
    optional_str(message, pointer).ok_or(MissingField(field_name(pointer)))
}

/// Converts a field into a narrower integer; an out-of-range value counts
/// as missing.
fn narrow<T: TryFrom<u64>>(value: u64, pointer: &'static str) -> Result<T, MissingField> {
    T::try_from(value).map_err(|_| MissingField(field_name(pointer)))
}

fn optional_u64(message: &Value, pointer: &str) -> Option<u64> {
    message.pointer(pointer).and_then(lenient_u64)
}

fn optional_str(message: &Value, pointer: &str) -> Option<String> {
    message
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Reads an unsigned integer that the server may send as a number or as a
/// numeric string.
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }
}

fn from_secs(secs: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
}

fn from_millis(millis: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(i64::try_from(millis).ok()?)
}
