//! Telemetry record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Free-form string properties attached to a record
pub type Properties = BTreeMap<String, String>;

/// Exception severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

/// Errors raised when a record fails validation
#[derive(Debug, Error, PartialEq)]
pub enum TrackingError {
    /// A required identifying field is empty
    #[error("{kind} record is missing required field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    /// Metric value is NaN or infinite
    #[error("metric `{name}` has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },
    /// HTTP status outside the valid range
    #[error("status code {0} is outside 100..=599")]
    InvalidStatusCode(u16),
}

/// A named custom event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl EventRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A single metric sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An error observed by the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub message: String,
    #[serde(default)]
    pub stack_trace: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl ExceptionRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: String::new(),
            severity: Severity::default(),
            properties: Properties::new(),
        }
    }

    /// Build a record from an error, using its source chain as the trace
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self::new(error.to_string()).with_stack_trace(chain.join("\n"))
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = stack_trace.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// An outbound call made by the application (database, HTTP, queue...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub target: String,
    pub name: String,
    #[serde(default)]
    pub data: String,
    pub duration_ms: u64,
    pub result_code: i32,
    pub success: bool,
    #[serde(default)]
    pub type_name: String,
}

impl DependencyRecord {
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
            data: String::new(),
            duration_ms: 0,
            result_code: 0,
            success: true,
            type_name: String::new(),
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_result(mut self, result_code: i32, success: bool) -> Self {
        self.result_code = result_code;
        self.success = success;
        self
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

/// One completed inbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub duration_ms: u64,
}

impl RequestRecord {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        duration: Duration,
    ) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            status_code,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Payload of a telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RecordBody {
    Event(EventRecord),
    Metric(MetricRecord),
    Exception(ExceptionRecord),
    Dependency(DependencyRecord),
    Request(RequestRecord),
}

impl RecordBody {
    /// Short kind label, matching the serialized tag
    pub fn kind(&self) -> &'static str {
        match self {
            RecordBody::Event(_) => "event",
            RecordBody::Metric(_) => "metric",
            RecordBody::Exception(_) => "exception",
            RecordBody::Dependency(_) => "dependency",
            RecordBody::Request(_) => "request",
        }
    }

    /// Check the identifying fields and value ranges
    pub fn validate(&self) -> Result<(), TrackingError> {
        let kind = self.kind();
        let require = |value: &str, field: &'static str| {
            if value.trim().is_empty() {
                Err(TrackingError::MissingField { kind, field })
            } else {
                Ok(())
            }
        };

        match self {
            RecordBody::Event(e) => require(&e.name, "name"),
            RecordBody::Metric(m) => {
                require(&m.name, "name")?;
                if !m.value.is_finite() {
                    return Err(TrackingError::NonFiniteValue {
                        name: m.name.clone(),
                        value: m.value,
                    });
                }
                Ok(())
            }
            RecordBody::Exception(e) => require(&e.message, "message"),
            RecordBody::Dependency(d) => {
                require(&d.target, "target")?;
                require(&d.name, "name")
            }
            RecordBody::Request(r) => {
                require(&r.path, "path")?;
                require(&r.method, "method")?;
                if !(100..=599).contains(&r.status_code) {
                    return Err(TrackingError::InvalidStatusCode(r.status_code));
                }
                Ok(())
            }
        }
    }
}

/// A timestamped telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl TelemetryRecord {
    pub fn new(time: DateTime<Utc>, body: RecordBody) -> Self {
        Self { time, body }
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}
