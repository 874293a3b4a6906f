use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{PayMethod, Product};

/// What the bot expects from a user next. A typed enum instead of a loose
/// string map: an impossible transition is unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversation {
    AwaitingEmail,
    AwaitingDiscountCode { product: Product, method: PayMethod },
    AwaitingProof { purchase_id: String },
    AwaitingWithdrawAmount,
    AwaitingWithdrawDestination { amount_usd: f64, method: PayMethod },
    AwaitingTicket,
}

/// Per-user conversation state, owned by the app state rather than a module
/// global. Process-local and non-durable by design.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<i64, Conversation>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tg_id: i64, state: Conversation) {
        self.inner.lock().unwrap().insert(tg_id, state);
    }

    pub fn peek(&self, tg_id: i64) -> Option<Conversation> {
        self.inner.lock().unwrap().get(&tg_id).cloned()
    }

    pub fn take(&self, tg_id: i64) -> Option<Conversation> {
        self.inner.lock().unwrap().remove(&tg_id)
    }

    pub fn clear(&self, tg_id: i64) {
        self.inner.lock().unwrap().remove(&tg_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_consumes_state() {
        let sessions = SessionStore::new();
        sessions.set(5, Conversation::AwaitingEmail);
        assert_eq!(sessions.peek(5), Some(Conversation::AwaitingEmail));
        assert_eq!(sessions.take(5), Some(Conversation::AwaitingEmail));
        assert_eq!(sessions.take(5), None);
    }

    #[test]
    fn set_overwrites() {
        let sessions = SessionStore::new();
        sessions.set(5, Conversation::AwaitingEmail);
        sessions.set(5, Conversation::AwaitingTicket);
        assert_eq!(sessions.peek(5), Some(Conversation::AwaitingTicket));
    }
}
