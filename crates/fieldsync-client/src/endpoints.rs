//! Backend endpoint paths and request/response types.
//!
//! Paths are relative to `<base>/api`.

use serde::{Deserialize, Serialize};

use fieldsync_core::types::{AssignmentResponse, TicketId, UserProfile};

// ============================================================================
// Endpoint Paths
// ============================================================================

pub const LOGIN: &str = "/auth/login";

pub const REFRESH_TOKEN: &str = "/auth/refresh-token";

pub const ACTIVE_TICKET: &str = "/tickets/engineer/active-ticket";

pub const AVAILABLE_TICKETS: &str = "/tickets/engineer/available";

pub const PENDING_ASSIGNMENTS: &str = "/tickets/engineer/pending-assignments";

pub const TICKET_HISTORY: &str = "/tickets/engineer/history";

pub fn accept_ticket(ticket: &TicketId) -> String {
    format!("/tickets/{}/accept", ticket)
}

pub fn respond_assignment(ticket: &TicketId) -> String {
    format!("/tickets/engineer/respond-assignment/{}", ticket)
}

pub fn location_update(ticket: &TicketId) -> String {
    format!("/tickets/engineer/location/{}", ticket)
}

/// The role this client logs in as.
pub const ENGINEER_ROLE: &str = "Engineer";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for login.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub role: &'a str,
}

/// Response from login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Request body for refresh-token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response from refresh-token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// Request body for respond-assignment.
#[derive(Debug, Serialize)]
pub struct RespondAssignmentRequest {
    pub response: AssignmentResponse,
}

/// Request body for a location update.
#[derive(Debug, Serialize)]
pub struct LocationUpdateRequest {
    pub latitude: f64,
    pub longitude: f64,
}

/// Acknowledgement body returned by mutating ticket endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body format.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
