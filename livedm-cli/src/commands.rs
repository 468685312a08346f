//! Offline command execution and event formatting.

use crate::{Commands, EncodeOp, EncodingArg};
use colored::Colorize;
use livedm_core::{classify, DomainEvent};
use livedm_protocol::{decode, AuthParams, BodyEncoding, Encoder, FrameHeader, Operation};
use serde_json::Value;

/// Executes an offline command and returns the formatted output.
pub fn execute(cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Watch { .. } => unreachable!(),

        Commands::Decode { hex } => decode_hex(&hex),

        Commands::Encode {
            op,
            body,
            count,
            encoding,
        } => {
            let body = body.as_deref().map(parse_json_arg).transpose()?;
            encode_hex(op, body.as_ref(), count, encoding)
        }

        Commands::Classify { payload } => {
            let payload = parse_json_arg(&payload)?;
            match classify(&payload) {
                Some(event) => Ok(format!(
                    "{}\n{}",
                    format_event(&event),
                    serde_json::to_string_pretty(&event)?
                )),
                None => Ok("Not a recognized event".yellow().to_string()),
            }
        }
    }
}

/// Decodes a hex frame into a header summary followed by its messages.
fn decode_hex(input: &str) -> Result<String, Box<dyn std::error::Error>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(compact)?;

    let header = FrameHeader::parse(&bytes)?;
    let packet = decode(&bytes)?;

    let (op_name, sender) = match Operation::try_from(header.operation) {
        Ok(op) if op.is_client_originated() => (format!("{:?}", op), "client"),
        Ok(op) => (format!("{:?}", op), "server"),
        Err(code) => (format!("unknown({})", code), "unknown"),
    };

    let mut output = format!(
        "{} op={} from={} ver={} seq={} len={} header={}",
        "Frame".bold(),
        op_name.cyan(),
        sender,
        header.protocol_version,
        header.sequence,
        header.total_length,
        header.header_length
    );
    if bytes.len() > header.total_length as usize {
        output.push_str(&format!(
            "\n{}: {} trailing bytes ignored",
            "Warning".yellow(),
            bytes.len() - header.total_length as usize
        ));
    }

    if packet.is_empty() {
        output.push_str(&format!("\n{}", "(no messages)".dimmed()));
    }
    for (i, message) in packet.messages.iter().enumerate() {
        output.push_str(&format!("\n{} {}", format!("[{}]", i).dimmed(), format_json(message)));
    }
    Ok(output)
}

/// Encodes one frame and returns it as lowercase hex.
fn encode_hex(
    op: EncodeOp,
    body: Option<&Value>,
    count: u32,
    encoding: EncodingArg,
) -> Result<String, Box<dyn std::error::Error>> {
    let frame = match op {
        EncodeOp::Heartbeat => Encoder::heartbeat(),
        EncodeOp::HeartbeatReply => Encoder::heartbeat_reply(count),
        EncodeOp::AuthReply => {
            let code = body.and_then(|b| b.get("code")).and_then(Value::as_i64);
            Encoder::auth_reply(code.unwrap_or(0))?
        }
        EncodeOp::Auth => {
            let body = body.ok_or("auth requires a JSON body with uid, roomid and key")?;
            let params: AuthParams = match serde_json::from_value(body.clone()) {
                Ok(params) => params,
                Err(_) => AuthParams::new(
                    body.get("uid").and_then(Value::as_u64).unwrap_or(0),
                    body.get("roomid")
                        .and_then(Value::as_u64)
                        .ok_or("auth body needs a numeric roomid")?,
                    body.get("key").and_then(Value::as_str).unwrap_or_default(),
                ),
            };
            Encoder::auth(&params)?
        }
        EncodeOp::MessageReply => {
            let body = body.ok_or("message-reply requires a JSON body")?;
            match encoding {
                EncodingArg::Json => Encoder::message_reply(body)?,
                EncodingArg::Deflate | EncodingArg::Brotli => {
                    let values = match body {
                        Value::Array(values) => values.clone(),
                        single => vec![single.clone()],
                    };
                    let encoding = if encoding == EncodingArg::Deflate {
                        BodyEncoding::Deflate
                    } else {
                        BodyEncoding::Brotli
                    };
                    Encoder::compressed_message_reply(encoding, &values)?
                }
            }
        }
    };

    Ok(hex::encode(&frame))
}

/// Formats a domain event as one colored line.
pub fn format_event(event: &DomainEvent) -> String {
    match event {
        DomainEvent::Chat(chat) => {
            let mut name = chat.uname.cyan().to_string();
            if chat.guard_level.is_member() {
                name = format!("{} {}", "★".yellow(), name);
            }
            if let Some(medal) = &chat.medal {
                name = format!("{} {}", format!("[{} {}]", medal.name, medal.level).dimmed(), name);
            }
            let text = match &chat.emoticon_url {
                Some(url) => format!("{} {}", chat.text, format!("<{}>", url).dimmed()),
                None => chat.text.clone(),
            };
            format!("{}: {}", name, text)
        }
        DomainEvent::Gift(gift) => format!(
            "{} {} {} {} x{} ({})",
            "GIFT".magenta().bold(),
            gift.uname.cyan(),
            gift.action,
            gift.gift_name.yellow(),
            gift.num,
            gift.value()
        ),
        DomainEvent::Membership(m) => format!(
            "{} {} bought {} x{}",
            "MEMBER".green().bold(),
            m.uname.cyan(),
            m.gift_name.yellow(),
            m.num
        ),
        DomainEvent::SuperChat(sc) => format!(
            "{} {} {}: {}",
            "SUPER CHAT".red().bold(),
            format!("[{}]", sc.price).yellow(),
            sc.uname.cyan(),
            sc.message
        ),
        DomainEvent::Interaction(i) => {
            format!("{} {}", i.uname.cyan(), i.kind.as_str()).dimmed().to_string()
        }
        DomainEvent::EntryEffect(e) => e.copy_writing.dimmed().to_string(),
        DomainEvent::ViewerCount(v) => format!("{} {}", "Viewers:".dimmed(), v.count),
        DomainEvent::RoomStats(s) => format!(
            "{} {} followers, {} fan club",
            "Stats:".dimmed(),
            s.followers,
            s.fans_club
        ),
    }
}

/// Parses a JSON argument (either inline JSON or @file.json).
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
