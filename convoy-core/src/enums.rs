//! Enum types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{FIELD_ASN, FIELD_CREATED_TIME};

/// Where a remote-store read is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadMode {
    /// Local offline cache only.
    Cache,
    /// Round trip to the server; a successful read also warms the cache.
    Server,
}

impl ReadMode {
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Message-list screens backed by a paginated aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageFolder {
    Inbox,
    Sent,
    Draft,
    Trash,
}

impl MessageFolder {
    pub const ALL: [MessageFolder; 4] = [Self::Inbox, Self::Sent, Self::Draft, Self::Trash];

    /// Collection segment under `customers/{cid}/vehicles/{vid}`.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "outbox",
            Self::Draft => "drafts",
            Self::Trash => "trash",
        }
    }

    /// Field holding the record's identity and sort key.
    ///
    /// Inbox messages are keyed by ASN; everything the driver produced is
    /// keyed by creation time.
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Inbox => FIELD_ASN,
            Self::Sent | Self::Draft | Self::Trash => FIELD_CREATED_TIME,
        }
    }
}

impl fmt::Display for MessageFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.collection())
    }
}

/// Collections guarded by a server-side last-modified marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    Units,
    Forms,
    Users,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 3] = [Self::Units, Self::Forms, Self::Users];

    /// Document id under `customers/{cid}/lastModified`.
    pub fn document_id(self) -> &'static str {
        match self {
            Self::Units => "units",
            Self::Forms => "forms",
            Self::Users => "users",
        }
    }

    /// Local preference key holding the last synced marker value.
    pub fn preference_key(self) -> &'static str {
        match self {
            Self::Units => "marker.units",
            Self::Forms => "marker.forms",
            Self::Users => "marker.users",
        }
    }
}

/// Entry point that triggered an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckSource {
    ListScreen,
    NotificationTap,
    FallbackSweep,
}

impl AckSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListScreen => "list_screen",
            Self::NotificationTap => "notification_tap",
            Self::FallbackSweep => "fallback_sweep",
        }
    }
}

/// Acknowledgment progress of an inbox message. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AckState {
    Unacknowledged,
    DeliveredOnly,
    ReadAndDelivered,
}

impl AckState {
    /// Derive the state from the record's flags.
    ///
    /// A read flag without a delivered flag still needs the delivery
    /// handshake, so it maps to `Unacknowledged`.
    pub fn from_flags(is_delivered: bool, is_read: bool) -> Self {
        match (is_delivered, is_read) {
            (true, true) => Self::ReadAndDelivered,
            (true, false) => Self::DeliveredOnly,
            (false, _) => Self::Unacknowledged,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ReadAndDelivered)
    }
}

/// Confirmation events written by the ack sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckEventKind {
    Delivered,
    Read,
}

impl AckEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}
