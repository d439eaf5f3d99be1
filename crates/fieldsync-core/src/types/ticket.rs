//! Ticket identifiers and the ticket record as served by the backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// The backend identifier of a ticket.
///
/// Ticket ids are interpolated into request paths, so they must be non-empty
/// and free of whitespace and path separators.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Create a new ticket id, validating the format.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidInputError::TicketId {
                value: s,
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        if s.chars().any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#') {
            return Err(InvalidInputError::TicketId {
                value: s,
                reason: "must not contain whitespace, '/', '?' or '#'".to_string(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TicketId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TicketId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TicketId::new(s).map_err(serde::de::Error::custom)
    }
}

/// A work ticket.
///
/// Lifecycle and payment semantics are owned by the backend; only the fields
/// this client displays are typed, everything else is carried in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(rename = "_id")]
    pub id: TicketId,

    /// Human-facing ticket number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An engineer's answer to a pending assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentResponse {
    Accepted,
    Rejected,
}

impl FromStr for AssignmentResponse {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" | "accept" => Ok(Self::Accepted),
            "rejected" | "reject" => Ok(Self::Rejected),
            other => Err(InvalidInputError::Other {
                message: format!("unknown assignment response '{}'", other),
            }
            .into()),
        }
    }
}
