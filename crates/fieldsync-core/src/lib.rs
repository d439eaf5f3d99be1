//! fieldsync-core - Core types and traits for the FieldSync client.
//!
//! This crate holds the vocabulary shared by the storage backends, the API
//! client and the CLI: credential types, validated identifiers, the unified
//! error type, and the traits at the seams where the host platform plugs in
//! (durable storage, background task scheduling, location permissions).

pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;

pub use error::Error;
pub use tokens::{AccessToken, CredentialPair, RefreshToken};
pub use traits::{
    LocationPermissions, PermissionStatus, TaskScheduler, TokenStore, TrackingOptions,
};
pub use types::{AssignmentResponse, BaseUrl, LocationSample, Ticket, TicketId, UserProfile};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
