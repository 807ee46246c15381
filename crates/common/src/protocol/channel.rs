// Frames exchanged on the edit channel WebSocket (`/v1/channel`).
//
// One socket carries any number of document subscriptions. Edits carry no
// sequence number and are never acknowledged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::EditMessage;

/// All frame types of the folio-channel.v1 protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelFrame {
    /// Client -> Server: start receiving edits for a document.
    Subscribe {
        #[serde(rename = "documentId")]
        document_id: Uuid,
    },

    /// Server -> Client: subscription is live.
    Subscribed {
        #[serde(rename = "documentId")]
        document_id: Uuid,
    },

    /// Client -> Server: stop receiving edits for a document.
    Unsubscribe {
        #[serde(rename = "documentId")]
        document_id: Uuid,
    },

    /// Bidirectional: an in-progress edit. The server fans it out to every
    /// subscriber of the document, the sender included.
    Edit(EditMessage),

    /// Server -> Client: error.
    Error { code: String, message: String },
}

pub const CHANNEL_PROTOCOL: &str = "folio-channel.v1";

pub fn decode_frame(raw: &str) -> Result<ChannelFrame, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn encode_frame(frame: &ChannelFrame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}
