//! Inbound events and outbound send targets.
//!
//! The host event bus delivers one [`InboundEvent`] per message or notice;
//! registered matchers evaluate their predicates against it. The registry
//! never talks to the network itself: replies go back out through the send
//! collaborator addressed by a [`SendTarget`].

use crate::MessageMask;
use serde::{Deserialize, Serialize};

/// What happened: a user message or a bus notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventBody {
    /// A user-authored message.
    Message {
        /// The single class bit for this message's channel.
        class: MessageMask,
        /// Plain text content.
        text: String,
        /// True when the message explicitly addresses the responder.
        addressed: bool,
    },
    /// A non-message notice (member joined, poke, etc.).
    Notice {
        category: String,
        #[serde(default)]
        subtype: String,
    },
}

/// One event delivered by the host bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub body: EventBody,
    /// Originating group channel, 0 for direct messages.
    #[serde(default)]
    pub group_id: i64,
    /// Originating user.
    #[serde(default)]
    pub user_id: i64,
    /// The raw event as received, made available to templates.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl InboundEvent {
    /// Where a reply to this event should be sent.
    #[must_use]
    pub fn reply_target(&self) -> SendTarget {
        if self.group_id != 0 {
            SendTarget::Group(self.group_id)
        } else {
            SendTarget::User(self.user_id)
        }
    }
}

/// Destination for an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTarget {
    User(i64),
    Group(i64),
}
