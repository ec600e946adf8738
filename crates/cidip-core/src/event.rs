//! Decoded Contact ID alarm event
//!
//! An [`Event`] is only ever produced by [`crate::decode`]. Once built it is
//! immutable; the fields are exposed through accessors.

use crate::codes::{describe_event_code, describe_qualifier, CodeTables};
use serde::Serialize;

/// Event code of a Service Test Report (routine poll from the panel)
pub const SERVICE_TEST_REPORT: u16 = 602;

/// One decoded alarm notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    raw: String,
    username: String,
    #[serde(skip_serializing)]
    password: String,
    client_code: String,
    cid: String,
    message_type: u8,
    event_qualifier: u8,
    event_code: u16,
    group: u8,
    sensor_or_user: u16,
}

/// Numeric Contact ID fields, as sliced out of the 11-digit string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CidFields {
    pub message_type: u8,
    pub event_qualifier: u8,
    pub event_code: u16,
    pub group: u8,
    pub sensor_or_user: u16,
}

impl Event {
    pub(crate) fn new(
        raw: String,
        username: String,
        password: String,
        client_code: String,
        cid: String,
        fields: CidFields,
    ) -> Self {
        Self {
            raw,
            username,
            password,
            client_code,
            cid,
            message_type: fields.message_type,
            event_qualifier: fields.event_qualifier,
            event_code: fields.event_code,
            group: fields.group,
            sensor_or_user: fields.sensor_or_user,
        }
    }

    /// The received line, trimmed of line terminators
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Panel/site identifier
    pub fn client_code(&self) -> &str {
        &self.client_code
    }

    /// The 11-digit Contact ID string as received
    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn event_qualifier(&self) -> u8 {
        self.event_qualifier
    }

    pub fn event_code(&self) -> u16 {
        self.event_code
    }

    /// Partition / group number
    pub fn group(&self) -> u8 {
        self.group
    }

    /// Zone number or user number, depending on the event code
    pub fn sensor_or_user(&self) -> u16 {
        self.sensor_or_user
    }

    /// True for a Service Test Report (code 602)
    pub fn is_test(&self) -> bool {
        self.event_code == SERVICE_TEST_REPORT
    }

    /// Rebuild the 11-digit Contact ID string from the numeric fields
    pub fn contact_id(&self) -> String {
        format!(
            "{:02}{}{:03}{:02}{:03}",
            self.message_type,
            self.event_qualifier,
            self.event_code,
            self.group,
            self.sensor_or_user
        )
    }

    /// Event code description from the built-in tables
    pub fn description(&self) -> String {
        describe_event_code(self.event_code)
    }

    /// Qualifier description from the built-in tables
    pub fn qualifier_description(&self) -> String {
        describe_qualifier(self.event_qualifier)
    }

    /// Event code description from a caller-supplied table set
    pub fn description_in(&self, tables: &CodeTables) -> String {
        tables.describe_event_code(self.event_code)
    }

    /// Qualifier description from a caller-supplied table set
    pub fn qualifier_description_in(&self, tables: &CodeTables) -> String {
        tables.describe_qualifier(self.event_qualifier)
    }
}
