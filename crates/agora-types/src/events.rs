use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ReactionAction;
use crate::models::{Message, StreamId};

/// Events pushed over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful identification
    Ready { user_id: Uuid, name: String },

    /// A message was appended to a channel or thread
    MessageCreate { message: Message },

    /// A reaction was added to or removed from a message
    ReactionToggle {
        stream: StreamId,
        message_id: Uuid,
        user_id: Uuid,
        emoji: String,
        action: ReactionAction,
    },

    /// A thread was opened in a forum
    ThreadCreate {
        forum_id: String,
        thread_id: Uuid,
        name: String,
        author_id: Uuid,
    },
}

impl GatewayEvent {
    /// Returns the stream this event is scoped to, if any.
    /// Events that return `None` are delivered to every identified client.
    pub fn stream_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => message.stream().map(|s| s.id()),
            Self::ReactionToggle { stream, .. } => Some(stream.id()),
            Self::Ready { .. } | Self::ThreadCreate { .. } => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace the set of streams whose scoped events this client receives
    Subscribe { stream_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_wire_format() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Identify","data":{"token":"abc"}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Identify { token } if token == "abc"));
    }

    #[test]
    fn reaction_events_are_stream_scoped() {
        let thread = Uuid::new_v4();
        let event = GatewayEvent::ReactionToggle {
            stream: StreamId::Thread(thread),
            message_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            emoji: "👍".into(),
            action: ReactionAction::Added,
        };
        assert_eq!(event.stream_id(), Some(thread));
    }
}
