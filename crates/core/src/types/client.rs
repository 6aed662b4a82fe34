//! Client records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::code::{ClientCode, PinCode};
use super::id::{ClientId, OwnerId};

/// A named link attached to a client (portfolio, gallery, chat, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLink {
    /// Label shown next to the link.
    pub name: String,
    /// Target URL.
    pub link: String,
}

impl ClientLink {
    /// Create a new client link.
    #[must_use]
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: link.into(),
        }
    }
}

/// A studio client.
///
/// `code` and `pin_code` are assigned once at creation and never change;
/// [`ClientPatch`] deliberately has no field for either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Store-assigned document id.
    pub id: ClientId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Six-digit pin handed to the client.
    pub pin_code: PinCode,
    /// Globally unique shareable code.
    pub code: ClientCode,
    /// Named links, in insertion order.
    #[serde(default)]
    pub client_links: Vec<ClientLink>,
    /// Owner that created the client.
    pub owner_identity: OwnerId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewClient {
    /// Create client input with the two required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }
}

/// Partial update for a client. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Full replacement of the link list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_links: Option<Vec<ClientLink>>,
}
