//! Workflow events
//!
//! Every externally observable step of a durable workflow is preceded by an
//! append to the store. Events are immutable once written; workflow state
//! is reconstructed by replaying them in sequence order.

use cero_core::TaskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-chosen workflow identity
pub type WorkflowId = String;

/// Events in a durable workflow's append-only log
///
/// Serialized with a dotted `type` tag (`"workflow.started"`,
/// `"step.completed"`, ...) plus the variant payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    // =========================================================================
    // Workflow Lifecycle Events
    // =========================================================================
    /// Workflow was started with the given input
    #[serde(rename = "workflow.started", rename_all = "camelCase")]
    WorkflowStarted {
        workflow_type: String,
        input: Value,
    },

    /// Workflow reached a good terminal outcome
    #[serde(rename = "workflow.completed")]
    WorkflowCompleted { result: Value },

    /// Workflow failed (or was cancelled)
    #[serde(rename = "workflow.failed")]
    WorkflowFailed { reason: String },

    // =========================================================================
    // Step Events
    // =========================================================================
    /// A pipeline step is about to execute
    #[serde(rename = "step.scheduled", rename_all = "camelCase")]
    StepScheduled { index: usize, task_type: String },

    /// A step finished with a good outcome
    ///
    /// Replay reapplies `result` and `context_delta` without re-executing.
    #[serde(rename = "step.completed", rename_all = "camelCase")]
    StepCompleted {
        index: usize,
        result: TaskResult,
        context_delta: Map<String, Value>,
    },

    /// A step failed
    #[serde(rename = "step.failed", rename_all = "camelCase")]
    StepFailed {
        index: usize,
        reason: String,
        metadata: Map<String, Value>,
        result: TaskResult,
    },

    // =========================================================================
    // Signal Events
    // =========================================================================
    /// An external signal was delivered
    #[serde(rename = "signal.received")]
    SignalReceived { name: String, args: Value },

    // =========================================================================
    // Condition Events
    // =========================================================================
    /// A condition waiter was registered
    #[serde(rename = "condition.scheduled", rename_all = "camelCase")]
    ConditionScheduled {
        id: String,
        timeout_ms: Option<u64>,
        #[serde(with = "chrono::serde::ts_milliseconds_option")]
        deadline: Option<DateTime<Utc>>,
    },

    /// The condition's predicate became true
    #[serde(rename = "condition.satisfied")]
    ConditionSatisfied { id: String },

    /// The condition's timeout elapsed first
    #[serde(rename = "condition.timeout")]
    ConditionTimeout { id: String },

    // =========================================================================
    // Sleep Events
    // =========================================================================
    /// A sleep was registered
    #[serde(rename = "sleep.scheduled", rename_all = "camelCase")]
    SleepScheduled {
        id: String,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        wake_at: DateTime<Utc>,
    },

    /// The sleep elapsed
    #[serde(rename = "sleep.completed")]
    SleepCompleted { id: String },
}

impl WorkflowEvent {
    /// Check whether this event terminates the workflow
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowCompleted { .. } | Self::WorkflowFailed { .. }
        )
    }

    /// The dotted type tag of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
            Self::StepScheduled { .. } => "step.scheduled",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::SignalReceived { .. } => "signal.received",
            Self::ConditionScheduled { .. } => "condition.scheduled",
            Self::ConditionSatisfied { .. } => "condition.satisfied",
            Self::ConditionTimeout { .. } => "condition.timeout",
            Self::SleepScheduled { .. } => "sleep.scheduled",
            Self::SleepCompleted { .. } => "sleep.completed",
        }
    }
}

/// One committed entry of a workflow's event log
///
/// Sequences are assigned by the runtime, 1-indexed and gap-free per
/// workflow; the store rejects any append whose sequence is not exactly
/// `last + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub workflow_id: WorkflowId,
    pub sequence: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl EventRecord {
    pub fn new(workflow_id: impl Into<WorkflowId>, sequence: u64, event: WorkflowEvent) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serialization_uses_dotted_tags() {
        let event = WorkflowEvent::WorkflowStarted {
            workflow_type: "order".to_string(),
            input: json!({"order_id": "123"}),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"workflow.started\""));

        let parsed: WorkflowEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_record_envelope_round_trip() {
        let record = EventRecord::new(
            "w1",
            3,
            WorkflowEvent::SignalReceived {
                name: "approve".to_string(),
                args: json!({"approved": true}),
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["workflowId"], json!("w1"));
        assert_eq!(value["sequence"], json!(3));
        assert_eq!(value["type"], json!("signal.received"));
        assert!(value["timestamp"].is_i64());

        let parsed: EventRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.sequence, 3);
        assert_eq!(parsed.event, record.event);
    }

    #[test]
    fn test_is_terminal() {
        assert!(WorkflowEvent::WorkflowCompleted { result: json!(null) }.is_terminal());
        assert!(WorkflowEvent::WorkflowFailed {
            reason: "boom".to_string()
        }
        .is_terminal());
        assert!(!WorkflowEvent::SleepCompleted {
            id: "sleep-0".to_string()
        }
        .is_terminal());
    }

    #[test]
    fn test_condition_deadline_serializes_as_millis() {
        let event = WorkflowEvent::ConditionScheduled {
            id: "condition-0".to_string(),
            timeout_ms: Some(50),
            deadline: Some(Utc::now()),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert!(value["deadline"].is_i64());

        let parsed: WorkflowEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.event_type(), "condition.scheduled");
    }
}
