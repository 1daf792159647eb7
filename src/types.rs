use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use serde::Serialize;

use crate::inspect::event_time;

/// Severity shared by namespace and cluster issue reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Ranking weight: critical 3, warning 2, info 1.
    pub fn weight(self) -> u8 {
        match self {
            Self::Critical => 3,
            Self::Warning => 2,
            Self::Info => 1,
        }
    }
}

/// Live usage of a node as reported by the metrics API.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeUsage {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeUtilization {
    pub cpu_millicores: i64,
    pub memory_bytes: i64,
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
}

/// Event as it appears in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub type_: String,
    pub reason: String,
    pub message: String,
    pub count: i32,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        Self {
            type_: event.type_.clone().unwrap_or_else(|| "Normal".to_string()),
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
            count: event.count.unwrap_or(1),
            first_seen: event.first_timestamp.as_ref().map(|t| t.0),
            last_seen: event_time(event),
            source: event_source(event).map(str::to_string),
        }
    }
}

/// Component that emitted the event (`source.component`, else `reportingComponent`).
pub fn event_source(event: &Event) -> Option<&str> {
    event
        .source
        .as_ref()
        .and_then(|s| s.component.as_deref())
        .or(event.reporting_component.as_deref())
        .filter(|s| !s.is_empty())
}
