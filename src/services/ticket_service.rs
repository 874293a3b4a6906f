use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use crate::gateway::Notifier;
use crate::models::Ticket;
use crate::sheets::table::{Keyed, Store};

/// Support tickets. Replies arrive either via the `/reply` command or as a
/// response typed straight into the sheet, which the reconciliation pass
/// delivers.
#[derive(Clone)]
pub struct TicketService {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl TicketService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn open(&self, tg_id: i64, username: &str, message: &str) -> Result<Ticket> {
        let subject: String = message.chars().take(48).collect();
        let ticket = Ticket::open(tg_id, username, &subject, message);
        self.store.insert(&ticket).await?;
        info!("ticket {} opened by {}", ticket.ticket_id, tg_id);
        Ok(ticket)
    }

    pub async fn find(&self, ticket_id: &str) -> Result<Option<Keyed<Ticket>>> {
        Ok(self
            .store
            .find_by::<Ticket, _>(|t| t.ticket_id == ticket_id)
            .await?)
    }

    /// Writes the response, closes the ticket, and DMs the user. Returns
    /// false when the ticket does not exist or is already closed.
    pub async fn reply(&self, ticket_id: &str, response: &str) -> Result<bool> {
        let Some(keyed) = self.find(ticket_id).await? else {
            return Ok(false);
        };
        if keyed.value.status != "open" {
            return Ok(false);
        }
        self.deliver_response(keyed, response).await?;
        Ok(true)
    }

    /// Closes the ticket with the given response and notifies the user.
    pub async fn deliver_response(
        &self,
        mut ticket: Keyed<Ticket>,
        response: &str,
    ) -> Result<()> {
        ticket.value.response = response.to_string();
        ticket.value.status = "closed".to_string();
        ticket.value.responded_at = Some(Utc::now());
        self.store.update(ticket.row_index, &ticket.value).await?;
        self.notifier
            .send(
                ticket.value.telegram_id,
                &format!(
                    "Support reply to your ticket {}:\n{}",
                    ticket.value.ticket_id, response
                ),
            )
            .await;
        info!("ticket {} closed", ticket.value.ticket_id);
        Ok(())
    }

    pub async fn open_tickets(&self) -> Result<Vec<Keyed<Ticket>>> {
        Ok(self
            .store
            .scan::<Ticket>()
            .await?
            .into_iter()
            .filter(|t| t.value.status == "open")
            .collect())
    }
}
