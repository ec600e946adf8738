//! Event handler trait
//!
//! Sessions hand every decoded [`Event`] to an [`EventHandler`]. One handler
//! instance is shared by all sessions, so implementations must tolerate
//! concurrent calls.

use crate::event::Event;
use async_trait::async_trait;
use std::fmt;

/// Consumer of decoded events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name, used in log messages
    fn name(&self) -> &str {
        "event-handler"
    }

    /// Called once per successfully decoded line
    async fn on_event(&self, event: Event);
}

/// Adapts a synchronous closure into an [`EventHandler`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Event) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: Event) {
        (self.f)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let handler = FnHandler::new("counter", move |event: Event| {
            assert_eq!(event.client_code(), "AXPRO");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(handler.name(), "counter");
        handler
            .on_event(decode("u,p,AXPRO,18340101501").unwrap())
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fn_handler_default_name_and_debug() {
        struct Anonymous;

        #[async_trait]
        impl EventHandler for Anonymous {
            async fn on_event(&self, _event: Event) {}
        }

        assert_eq!(Anonymous.name(), "event-handler");
        tokio_test::block_on(Anonymous.on_event(decode("u,p,c,18340101501").unwrap()));

        let handler = FnHandler::new("printer", |_event: Event| {});
        assert_eq!(format!("{:?}", handler), "FnHandler { name: \"printer\" }");
    }
}
