//! Audit history entries.

use crate::diagram::DiagramId;
use crate::operation::{Operation, OperationBody, OperationKind, TargetType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit record of one applied operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub diagram_id: DiagramId,
    pub user_id: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
    pub operation_type: OperationKind,
    pub target_type: TargetType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub lamport_clock: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<serde_json::Value>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Builds an audit entry for an applied operation.
    ///
    /// `merged_clock` is the pipeline's clock value after merge, which orders
    /// entries even when two clients produced the same sender clock.
    pub fn for_operation(
        diagram_id: &DiagramId,
        operation: &Operation,
        merged_clock: u64,
        user_picture: Option<String>,
    ) -> Self {
        let kind = operation.kind();
        let target_name = target_name_of(operation);
        let details = describe(kind, operation, target_name.as_deref());
        Self {
            id: Uuid::new_v4().to_string(),
            diagram_id: diagram_id.clone(),
            user_id: operation.user_id.clone(),
            user_name: operation.user_name.clone(),
            user_picture,
            operation_type: kind,
            target_type: kind.target_type(),
            target_id: operation.target_id.clone(),
            target_name,
            lamport_clock: merged_clock,
            payload: serde_json::to_value(&operation.body)
                .ok()
                .and_then(|v| v.get("payload").cloned()),
            previous_state: operation.previous_state.clone(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Extracts a display name for the operation target, when the payload has one.
fn target_name_of(operation: &Operation) -> Option<String> {
    match &operation.body {
        OperationBody::EntityCreate(entity) => Some(entity.name.clone()),
        OperationBody::EntityUpdate(patch) => patch.name.clone(),
        OperationBody::ScreenCreate(screen) => Some(screen.name.clone()),
        OperationBody::ScreenUpdate(patch) => patch.name.clone(),
        OperationBody::FlowCreate(flow) => flow.label.clone(),
        _ => None,
    }
}

fn describe(kind: OperationKind, operation: &Operation, target_name: Option<&str>) -> String {
    let subject = target_name
        .or(operation.target_id.as_deref())
        .unwrap_or("diagram");
    format!("{} {} by {}", kind, subject, operation.user_name)
}
