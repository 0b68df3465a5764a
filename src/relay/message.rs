//! Relay wire protocol
//!
//! Text messages exchanged with producers and viewers. Binary frames are
//! relayed verbatim and have no representation here.

use serde::{Deserialize, Serialize};

/// Prefix of a producer identification message
pub const PRODUCER_PREFIX: &str = "STREAMER:";

/// Subscriber identification message
pub const SUBSCRIBER_MARKER: &str = "CLIENT";

/// Subscriber request for a fresh producer list
pub const LIST_REQUEST: &str = "get_pcs";

/// First message of a connection, declaring its role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// `STREAMER:<name>`
    Producer(String),
    /// `CLIENT`
    Subscriber,
}

impl Identification {
    /// Parse an identification message
    ///
    /// The producer name is everything after the first `:`, so a name that
    /// itself contains `:` is kept whole. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(name) = text.strip_prefix(PRODUCER_PREFIX) {
            Some(Identification::Producer(name.to_string()))
        } else if text == SUBSCRIBER_MARKER {
            Some(Identification::Subscriber)
        } else {
            None
        }
    }
}

/// Control message sent by a subscriber after identification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Re-send the current producer list
    ListProducers,
}

impl ControlMessage {
    /// Parse a subscriber control message
    pub fn parse(text: &str) -> Option<Self> {
        (text == LIST_REQUEST).then_some(ControlMessage::ListProducers)
    }
}

/// Events pushed to subscribers as JSON text
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RelayEvent {
    /// Current set of producer names
    #[serde(rename = "pc_list")]
    ProducerList { pcs: Vec<String> },
}

impl RelayEvent {
    /// Producer list event for `names`
    pub fn producer_list(names: Vec<String>) -> Self {
        RelayEvent::ProducerList { pcs: names }
    }

    /// Serialize to a JSON text message
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
