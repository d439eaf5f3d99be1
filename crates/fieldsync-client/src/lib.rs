//! fieldsync-client - Session and API client for the FieldSync backend.
//!
//! The pieces, leaf-first:
//!
//! - [`ApiClient`]: the single HTTP pipeline. Stamps every request with the
//!   current bearer token and runs the single-flight refresh protocol on 401.
//! - [`SessionManager`]: restores, creates and destroys the session.
//! - [`LocationTracker`] / [`LocationReporter`]: arm, disarm and run the
//!   background location task.
//! - [`RealtimeChannelManager`]: one authenticated socket channel per token.

mod client;
mod config;
mod endpoints;
mod http;
mod realtime;
mod refresh;
mod session;
mod tickets;
mod tracking;

pub use client::{ApiClient, AuthEvent};
pub use config::{ClientConfig, DEFAULT_TIMEOUT};
pub use endpoints::{ENGINEER_ROLE, LoginResponse};
pub use realtime::{ChannelEvent, RealtimeChannel, RealtimeChannelManager};
pub use session::{ActiveTicketSync, Session, SessionManager, SessionState};
pub use tickets::TicketsApi;
pub use tracking::{
    BackendView, InvocationOutcome, LocationReporter, LocationTracker, MarkerState,
    ReportAction, StartOutcome, TrackingState, plan,
};
