//! Ticket endpoints for the logged-in engineer.

use reqwest::Method;
use tracing::{debug, instrument};

use fieldsync_core::types::{AssignmentResponse, LocationSample, Ticket, TicketId};
use fieldsync_core::Result;

use crate::client::ApiClient;
use crate::endpoints::{self, LocationUpdateRequest, MessageResponse, RespondAssignmentRequest};
use crate::http::{ApiRequest, decode};

/// Ticket operations, borrowed from an [`ApiClient`].
///
/// Every call goes through the client's authenticated pipeline.
#[derive(Debug, Clone, Copy)]
pub struct TicketsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> TicketsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// The ticket the engineer is currently working, if any.
    #[instrument(skip(self))]
    pub async fn active_ticket(&self) -> Result<Option<Ticket>> {
        let ticket: Option<Ticket> = self.client.get(endpoints::ACTIVE_TICKET).await?;
        debug!(active = ?ticket.as_ref().map(|t| t.id.as_str()), "Fetched active ticket");
        Ok(ticket)
    }

    /// Open tickets the engineer may accept.
    #[instrument(skip(self))]
    pub async fn available(&self) -> Result<Vec<Ticket>> {
        self.list(endpoints::AVAILABLE_TICKETS).await
    }

    /// Tickets assigned to the engineer that await a response.
    #[instrument(skip(self))]
    pub async fn pending_assignments(&self) -> Result<Vec<Ticket>> {
        self.list(endpoints::PENDING_ASSIGNMENTS).await
    }

    /// Tickets the engineer has completed.
    #[instrument(skip(self))]
    pub async fn history(&self) -> Result<Vec<Ticket>> {
        self.list(endpoints::TICKET_HISTORY).await
    }

    async fn list(&self, path: &str) -> Result<Vec<Ticket>> {
        let tickets: Option<Vec<Ticket>> = self.client.get(path).await?;
        Ok(tickets.unwrap_or_default())
    }

    /// Accept an open ticket.
    #[instrument(skip(self), fields(%ticket))]
    pub async fn accept(&self, ticket: &TicketId) -> Result<Option<String>> {
        let request = ApiRequest::new(Method::PUT, endpoints::accept_ticket(ticket));
        let body: Option<MessageResponse> = decode(self.client.execute(request).await?).await?;
        Ok(body.and_then(|b| b.message))
    }

    /// Accept or reject an assignment.
    #[instrument(skip(self), fields(%ticket, ?response))]
    pub async fn respond_assignment(
        &self,
        ticket: &TicketId,
        response: AssignmentResponse,
    ) -> Result<Option<String>> {
        let body: Option<MessageResponse> = self
            .client
            .put(
                &endpoints::respond_assignment(ticket),
                &RespondAssignmentRequest { response },
            )
            .await?;
        Ok(body.and_then(|b| b.message))
    }

    /// Submit a location sample for a ticket.
    #[instrument(skip(self, sample), fields(%ticket))]
    pub async fn post_location(&self, ticket: &TicketId, sample: &LocationSample) -> Result<()> {
        let _: Option<MessageResponse> = self
            .client
            .post(
                &endpoints::location_update(ticket),
                &LocationUpdateRequest {
                    latitude: sample.latitude,
                    longitude: sample.longitude,
                },
            )
            .await?;
        Ok(())
    }
}
