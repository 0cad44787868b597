//! Metric extraction from parsed log events.

use std::collections::HashMap;

use crate::input::{Emitter, KeyClasses};
use crate::record::MetricValue;

use super::parsers::LogEvent;

/// Turns one parsed event into records.
pub trait EventMetrics: Send {
    fn extract(&mut self, event: LogEvent, out: &mut Emitter<'_>);
}

/// One record per field, kind chosen by the section's key lists;
/// `kv_keys` fields become `field.value = 1`.
#[derive(Debug, Clone, Default)]
pub struct FieldMetrics {
    classes: KeyClasses,
}

impl FieldMetrics {
    pub fn new(classes: KeyClasses) -> Self {
        Self { classes }
    }
}

impl EventMetrics for FieldMetrics {
    fn extract(&mut self, event: LogEvent, out: &mut Emitter<'_>) {
        for (field, value) in event.fields {
            let kind = self.classes.kind_of(&field);
            if self.classes.is_kv(&field) {
                out.emit(&format!("{field}.{value}"), 1, kind);
            } else {
                out.emit(&field, value, kind);
            }
        }
    }
}

/// Open sessions per user (gauge) and authentication attempts per
/// method and user (counter).
#[derive(Debug, Default)]
pub struct AuthSessions {
    open: HashMap<String, i64>,
}

impl AuthSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current open-session count for `user`.
    pub fn open_sessions(&self, user: &str) -> i64 {
        self.open.get(user).copied().unwrap_or(0)
    }
}

fn text(event: &LogEvent, field: &str) -> Option<String> {
    event.get(field).map(MetricValue::to_string)
}

impl EventMetrics for AuthSessions {
    fn extract(&mut self, event: LogEvent, out: &mut Emitter<'_>) {
        let Some(user) = text(&event, "user") else {
            return;
        };

        if let Some(action) = text(&event, "action") {
            let count = self.open.entry(user.clone()).or_insert(0);
            *count = if action == "opened" {
                *count + 1
            } else {
                (*count - 1).max(0)
            };
            out.gauge(&user, *count);
        } else if let Some(method) = text(&event, "method") {
            out.counter(&format!("{method}.{user}"), 1);
        }
    }
}
