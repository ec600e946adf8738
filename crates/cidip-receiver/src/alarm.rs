//! Alarm logging handler
//!
//! Logs decoded events from allow-listed panels. Service Test Reports are
//! condensed to a single "Test ok" line unless test suppression is off.

use async_trait::async_trait;
use cidip_core::config::AlertSettings;
use cidip_core::{CodeTables, Event, EventHandler};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What the logger does with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Client code not in the allow-list
    Rejected,
    /// Routine test report, logged as one line
    TestOk,
    /// Logged in full
    Alarm,
}

/// Handler that writes alarm details to the log
pub struct AlarmLogger {
    allowed_clients: HashSet<String>,
    suppress_tests: bool,
    tables: Arc<CodeTables>,
}

impl AlarmLogger {
    /// Log every client, suppressing test reports
    pub fn new(tables: Arc<CodeTables>) -> Self {
        Self {
            allowed_clients: HashSet::new(),
            suppress_tests: true,
            tables,
        }
    }

    pub fn from_settings(settings: &AlertSettings, tables: Arc<CodeTables>) -> Self {
        Self::new(tables)
            .with_allowed_clients(settings.allowed_clients.iter().cloned())
            .with_suppress_tests(settings.suppress_tests)
    }

    /// Restrict logging to these client codes (empty = all)
    pub fn with_allowed_clients<I>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.allowed_clients = clients.into_iter().collect();
        self
    }

    pub fn with_suppress_tests(mut self, suppress: bool) -> Self {
        self.suppress_tests = suppress;
        self
    }

    pub fn is_allowed(&self, client_code: &str) -> bool {
        self.allowed_clients.is_empty() || self.allowed_clients.contains(client_code)
    }

    pub fn classify(&self, event: &Event) -> Disposition {
        if !self.is_allowed(event.client_code()) {
            Disposition::Rejected
        } else if self.suppress_tests && event.is_test() {
            Disposition::TestOk
        } else {
            Disposition::Alarm
        }
    }

    /// Log lines describing one alarm
    pub fn alarm_lines(&self, event: &Event) -> Vec<String> {
        vec![
            format!("Client: {} (CID {})", event.client_code(), event.cid()),
            format!(
                "Event Qualifier: {}",
                event.qualifier_description_in(&self.tables)
            ),
            format!("Event Code: {}", event.description_in(&self.tables)),
            format!("Partition: {:02}", event.group()),
            format!("Zone / User: {:03}", event.sensor_or_user()),
        ]
    }
}

#[async_trait]
impl EventHandler for AlarmLogger {
    fn name(&self) -> &str {
        "alarm-logger"
    }

    async fn on_event(&self, event: Event) {
        match self.classify(&event) {
            Disposition::Rejected => {
                debug!("Ignoring event from unlisted client {}", event.client_code())
            }
            Disposition::TestOk => info!("Test ok ({})", event.client_code()),
            Disposition::Alarm => {
                for line in self.alarm_lines(&event) {
                    info!("{}", line);
                }
                info!("----------------------------");
            }
        }
    }
}
