//! Core domain types.
//!
//! Identifiers enforce their invariants at construction time; records that
//! the backend owns keep any fields this client does not interpret.

mod base_url;
mod location;
mod profile;
mod ticket;

pub use base_url::BaseUrl;
pub use location::LocationSample;
pub use profile::UserProfile;
pub use ticket::{AssignmentResponse, Ticket, TicketId};
