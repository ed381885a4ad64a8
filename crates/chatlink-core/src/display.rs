//! Chat-line conventions used by front-ends on top of the raw transport.
//!
//! The transport never looks at message content; these helpers only encode
//! what the server and other clients put on the wire.

const BROADCAST_PREFIX: &str = "[BROADCAST FROM SERVER]:";
const SENT_ACK: &str = "MESSAGE_SENT_SUCCESS";
/// Older servers echo every message back behind this prefix ("Server received:").
const LEGACY_ACK_PREFIX: &str = "Server nhận được:";

/// How an inbound raw message should be shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMessage {
    /// `"[sender]: content"` from another user.
    User { sender: String, content: String },
    /// Server broadcast, prefix stripped.
    Broadcast(String),
    /// Delivery acknowledgment; not shown.
    Ack,
    /// Anything else, shown verbatim.
    System(String),
}

pub fn classify_inbound(raw: &str) -> DisplayMessage {
    if let Some(rest) = raw.strip_prefix(BROADCAST_PREFIX) {
        return DisplayMessage::Broadcast(rest.trim().to_owned());
    }
    if raw == SENT_ACK || raw.starts_with(LEGACY_ACK_PREFIX) {
        return DisplayMessage::Ack;
    }
    parse_user_message(raw).unwrap_or_else(|| DisplayMessage::System(raw.to_owned()))
}

/// Split `"[sender]: content"` at the first `"]:"`. The sender must be
/// non-empty.
fn parse_user_message(raw: &str) -> Option<DisplayMessage> {
    let body = raw.strip_prefix('[')?;
    let end = body.find("]:")?;
    if end == 0 {
        return None;
    }
    Some(DisplayMessage::User {
        sender: body[..end].to_owned(),
        content: body[end + 2..].trim().to_owned(),
    })
}

/// `"[user]: text"`
pub fn format_chat_line(username: &str, text: &str) -> String {
    format!("[{username}]: {text}")
}

pub fn format_join_notice(username: &str) -> String {
    format!("[{username}] joined the chat")
}

pub fn format_leave_notice(username: &str) -> String {
    format!("[{username}] left the chat")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_splits_at_first_marker() {
        assert_eq!(
            classify_inbound("[bob]: hi ]: there"),
            DisplayMessage::User { sender: "bob".into(), content: "hi ]: there".into() }
        );
    }

    #[test]
    fn broadcast_and_ack() {
        assert_eq!(
            classify_inbound("[BROADCAST FROM SERVER]:  maintenance at 5"),
            DisplayMessage::Broadcast("maintenance at 5".into())
        );
        assert_eq!(classify_inbound("MESSAGE_SENT_SUCCESS"), DisplayMessage::Ack);
    }

    #[test]
    fn legacy_echo_is_an_ack() {
        assert_eq!(classify_inbound("Server nhận được: [alice]: hi"), DisplayMessage::Ack);
        assert_eq!(classify_inbound("Server nhận được: HANDSHAKE_REQUEST"), DisplayMessage::Ack);
    }

    #[test]
    fn malformed_lines_are_system_messages() {
        for raw in ["[]: empty sender", "no brackets", "[alice] joined the chat"] {
            assert_eq!(classify_inbound(raw), DisplayMessage::System(raw.into()));
        }
    }

    #[test]
    fn outbound_round_trips_through_classifier() {
        let line = format_chat_line("carol", "hello");
        assert_eq!(line, "[carol]: hello");
        assert_eq!(
            classify_inbound(&line),
            DisplayMessage::User { sender: "carol".into(), content: "hello".into() }
        );
    }
}
