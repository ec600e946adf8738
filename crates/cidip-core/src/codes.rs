//! Contact ID event code and qualifier descriptions
//!
//! Lookups never fail: an unknown code is described by its own digits.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Built-in event code descriptions
const EVENT_CODES: &[(u16, &str)] = &[
    (100, "Medical Emergency"),
    (101, "Fire Alarm"),
    (110, "Power Outage"),
    (120, "Panic Alarm"),
    (130, "Burglary"),
    (131, "Perimeter Burglary"),
    (132, "Interior Burglary"),
    (134, "Entry/Exit Burglary"),
    (137, "Tamper"),
    (144, "Sensor Tamper"),
    (301, "AC Loss"),
    (302, "Low System Battery"),
    (350, "Communication Trouble"),
    (401, "Open/Close by User"),
    (406, "Cancel"),
    (407, "Remote Arming/Disarming"),
    (408, "Quick Arm"),
    (441, "Stay Arming"),
    (570, "Bypass"),
    (602, "Service Test Report"),
    (627, "Program Mode Entry"),
    (628, "Program Mode Exit"),
];

/// Built-in event qualifier descriptions
const QUALIFIERS: &[(u8, &str)] = &[
    (1, "New Event or Opening/Disarm"),
    (3, "New Restore or Closing/Arming"),
    (6, "Previously reported condition still present (status report)"),
];

static STANDARD: Lazy<CodeTables> = Lazy::new(CodeTables::new);

/// Code and qualifier description tables
///
/// Immutable once built; share behind an `Arc` or use [`CodeTables::standard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTables {
    event_codes: BTreeMap<u16, String>,
    qualifiers: BTreeMap<u8, String>,
}

impl CodeTables {
    /// Tables holding the built-in descriptions
    pub fn new() -> Self {
        Self {
            event_codes: EVENT_CODES
                .iter()
                .map(|(code, desc)| (*code, desc.to_string()))
                .collect(),
            qualifiers: QUALIFIERS
                .iter()
                .map(|(code, desc)| (*code, desc.to_string()))
                .collect(),
        }
    }

    /// Process-wide built-in tables
    pub fn standard() -> &'static CodeTables {
        &STANDARD
    }

    /// Add or replace event code descriptions
    pub fn with_event_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        self.event_codes
            .extend(codes.into_iter().map(|(code, desc)| (code, desc.into())));
        self
    }

    /// Add or replace qualifier descriptions
    pub fn with_qualifiers<I, S>(mut self, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = (u8, S)>,
        S: Into<String>,
    {
        self.qualifiers
            .extend(qualifiers.into_iter().map(|(code, desc)| (code, desc.into())));
        self
    }

    pub fn event_code(&self, code: u16) -> Option<&str> {
        self.event_codes.get(&code).map(String::as_str)
    }

    pub fn qualifier(&self, qualifier: u8) -> Option<&str> {
        self.qualifiers.get(&qualifier).map(String::as_str)
    }

    /// `"<description> (<code>)"`, or the bare 3-digit code when unknown
    pub fn describe_event_code(&self, code: u16) -> String {
        let key = format!("{:03}", code);
        match self.event_code(code) {
            Some(desc) => format!("{} ({})", desc, key),
            None => key,
        }
    }

    /// `"<description> (<qualifier>)"`, or the bare qualifier when unknown
    pub fn describe_qualifier(&self, qualifier: u8) -> String {
        match self.qualifier(qualifier) {
            Some(desc) => format!("{} ({})", desc, qualifier),
            None => qualifier.to_string(),
        }
    }

    /// Known event codes in ascending order
    pub fn event_codes(&self) -> impl Iterator<Item = (u16, &str)> {
        self.event_codes
            .iter()
            .map(|(code, desc)| (*code, desc.as_str()))
    }

    /// Known qualifiers in ascending order
    pub fn qualifiers(&self) -> impl Iterator<Item = (u8, &str)> {
        self.qualifiers
            .iter()
            .map(|(code, desc)| (*code, desc.as_str()))
    }
}

impl Default for CodeTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Describe an event code using the built-in tables
pub fn describe_event_code(code: u16) -> String {
    CodeTables::standard().describe_event_code(code)
}

/// Describe an event qualifier using the built-in tables
pub fn describe_qualifier(qualifier: u8) -> String {
    CodeTables::standard().describe_qualifier(qualifier)
}
