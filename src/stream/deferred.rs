//! Deferred loader fields.
//!
//! # Responsibilities
//! - Partition loader output into immediate values and pending fragments
//! - Settle a fragment, isolating failures (errors and panics)
//! - Serialise a settlement into a self-contained wire unit
//!
//! # Wire Unit
//! ```text
//! <script type="application/json" id="{tag}-deferred-{key}">{"status":"resolved","value":…}</script>
//! <deferred-fragment data-id="{tag}-deferred-{key}"></deferred-fragment>
//! ```
//! The payload and its trigger share the id; a rejected fragment carries
//! `{"status":"rejected","error":"…"}` instead.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::render::escape_html;
use crate::stream::inject::escape_json_for_script;

/// Failure of a single deferred field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FragmentError(pub String);

impl From<&str> for FragmentError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for FragmentError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// State of one loader field.
pub enum FieldState {
    /// Still being computed.
    Pending(BoxFuture<'static, Result<Value, FragmentError>>),
    /// Available now.
    Resolved(Value),
    /// Failed before streaming began.
    Rejected(String),
}

impl FieldState {
    pub fn pending<F>(future: F) -> Self
    where
        F: std::future::Future<Output = Result<Value, FragmentError>> + Send + 'static,
    {
        FieldState::Pending(future.boxed())
    }
}

impl fmt::Debug for FieldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldState::Pending(_) => f.write_str("Pending"),
            FieldState::Resolved(v) => f.debug_tuple("Resolved").field(v).finish(),
            FieldState::Rejected(e) => f.debug_tuple("Rejected").field(e).finish(),
        }
    }
}

/// Loader fields split before any streaming starts.
///
/// Resolved fields are immediate; pending and rejected fields are deferred.
/// The two maps never share a key.
#[derive(Debug, Default)]
pub struct PartitionedData {
    pub immediate: BTreeMap<String, Value>,
    pub deferred: BTreeMap<String, FieldState>,
}

impl PartitionedData {
    /// Partition fields. A later field with the same key replaces an earlier one.
    pub fn partition(fields: impl IntoIterator<Item = (String, FieldState)>) -> Self {
        let mut data = Self::default();
        for (key, state) in fields {
            match state {
                FieldState::Resolved(value) => {
                    data.deferred.remove(&key);
                    data.immediate.insert(key, value);
                }
                other => {
                    data.immediate.remove(&key);
                    data.deferred.insert(key, other);
                }
            }
        }
        data
    }

    /// Turn deferred fields into fragments for route `tag`.
    pub fn into_fragments(self, tag: &str) -> (BTreeMap<String, Value>, Vec<DeferredFragment>) {
        let fragments = self
            .deferred
            .into_iter()
            .map(|(key, state)| DeferredFragment::new(tag, key, state))
            .collect();
        (self.immediate, fragments)
    }
}

/// Identifier shared by a fragment's payload and trigger.
pub fn fragment_id(tag: &str, key: &str) -> String {
    format!("{tag}-deferred-{key}")
}

/// One deferred field awaiting settlement.
#[derive(Debug)]
pub struct DeferredFragment {
    pub key: String,
    pub id: String,
    state: FieldState,
}

impl DeferredFragment {
    pub fn new(tag: &str, key: impl Into<String>, state: FieldState) -> Self {
        let key = key.into();
        Self {
            id: fragment_id(tag, &key),
            key,
            state,
        }
    }

    /// Wait for the value. Never fails: errors and panics become rejections.
    pub async fn settle(self) -> Settlement {
        let outcome = match self.state {
            FieldState::Resolved(value) => Ok(value),
            FieldState::Rejected(message) => Err(message),
            FieldState::Pending(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.0),
                Err(_) => Err("deferred computation panicked".to_string()),
            },
        };
        Settlement {
            key: self.key,
            id: self.id,
            outcome,
        }
    }
}

/// A settled fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub key: String,
    pub id: String,
    pub outcome: Result<Value, String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Payload<'a> {
    Resolved { value: &'a Value },
    Rejected { error: &'a str },
}

impl Settlement {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Payload as a JSON value, for data-only responses.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self.envelope()).unwrap_or(Value::Null)
    }

    fn envelope(&self) -> Payload<'_> {
        match &self.outcome {
            Ok(value) => Payload::Resolved { value },
            Err(error) => Payload::Rejected { error },
        }
    }

    /// Self-contained HTML unit: data payload plus trigger.
    pub fn render(&self) -> Bytes {
        let json = serde_json::to_string(&self.envelope()).unwrap_or_else(|e| {
            tracing::error!(fragment = %self.id, error = %e, "Failed to serialise deferred payload");
            r#"{"status":"rejected","error":"serialisation failed"}"#.to_string()
        });
        let id = escape_html(&self.id);
        Bytes::from(format!(
            r#"<script type="application/json" id="{id}">{}</script><deferred-fragment data-id="{id}"></deferred-fragment>"#,
            escape_json_for_script(&json)
        ))
    }
}
