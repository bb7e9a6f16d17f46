//! Conversion of a stored peer row into an MTProto input peer.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Bot API ids of channels and supergroups are offset by this value.
const MAX_CHANNEL_ID: i64 = -1_000_000_000_000;

/// A peer addressable in an MTProto request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_", rename_all = "snake_case")]
pub enum InputPeer {
    User { user_id: i64, access_hash: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl InputPeer {
    /// The Bot API style id this peer was stored under.
    pub const fn peer_id(&self) -> i64 {
        match *self {
            Self::User { user_id, .. } => user_id,
            Self::Chat { chat_id } => -chat_id,
            Self::Channel { channel_id, .. } => MAX_CHANNEL_ID - channel_id,
        }
    }
}

/// Build an input peer from a stored `(id, access_hash, type)` triple.
///
/// `id` is the Bot API style id: negative for basic groups, offset by
/// `-10^12` for channels. A missing access hash is sent as 0.
pub fn input_peer(id: i64, access_hash: Option<i64>, peer_type: &str) -> StoreResult<InputPeer> {
    let access_hash = access_hash.unwrap_or_default();

    match peer_type {
        "user" | "bot" => Ok(InputPeer::User {
            user_id: id,
            access_hash,
        }),
        "group" => Ok(InputPeer::Chat { chat_id: -id }),
        "channel" | "supergroup" => Ok(InputPeer::Channel {
            channel_id: MAX_CHANNEL_ID - id,
            access_hash,
        }),
        other => Err(StoreError::InvalidPeerType(other.to_string())),
    }
}
