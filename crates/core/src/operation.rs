//! In-flight edit operations.
//!
//! Operations arrive as flat JSON records carrying a `type` discriminator and
//! a type-specific `payload`. [`OperationBody`] models that pair as an
//! adjacently tagged union so the apply engine can pattern-match on the kind
//! while the wire format stays byte-compatible with existing clients.

use crate::error::{CoreError, CoreResult};
use crate::model::{
    Attribute, AttributePatch, Entity, EntityPatch, Flow, FlowPatch, Position, Relationship,
    RelationshipPatch, Screen, ScreenPatch,
};
use serde::{Deserialize, Serialize};
use std::fmt;

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_user_name() -> String {
    "Anonymous".to_string()
}

/// Payload of ENTITY_MOVE and SCREEN_MOVE.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub position: Position,
}

/// Payload of the whole-list attribute operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeListPayload {
    pub attributes: Vec<Attribute>,
}

/// Payload of ATTRIBUTE_FIELD_UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFieldPayload {
    #[serde(rename = "attrId")]
    pub attr_id: String,
    pub updates: AttributePatch,
}

/// Payload of ERD_IMPORT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErdImportPayload {
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// Payload of SCREEN_IMPORT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenImportPayload {
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub screens: Vec<Screen>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

/// Operation discriminator and payload, adjacently tagged to match the wire
/// record's `type`/`payload` field pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationBody {
    EntityCreate(Entity),
    EntityUpdate(EntityPatch),
    EntityMove(MovePayload),
    EntityDelete,
    AttributeAdd(AttributeListPayload),
    AttributeUpdate(AttributeListPayload),
    AttributeDelete(AttributeListPayload),
    AttributeFieldUpdate(AttributeFieldPayload),
    RelationshipCreate(Relationship),
    RelationshipUpdate(RelationshipPatch),
    RelationshipDelete,
    ErdImport(ErdImportPayload),
    ScreenCreate(Screen),
    ScreenUpdate(ScreenPatch),
    ScreenMove(MovePayload),
    ScreenDelete,
    FlowCreate(Flow),
    FlowUpdate(FlowPatch),
    FlowDelete,
    ScreenImport(ScreenImportPayload),
}

impl OperationBody {
    /// Returns the discriminator for this body.
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationBody::EntityCreate(_) => OperationKind::EntityCreate,
            OperationBody::EntityUpdate(_) => OperationKind::EntityUpdate,
            OperationBody::EntityMove(_) => OperationKind::EntityMove,
            OperationBody::EntityDelete => OperationKind::EntityDelete,
            OperationBody::AttributeAdd(_) => OperationKind::AttributeAdd,
            OperationBody::AttributeUpdate(_) => OperationKind::AttributeUpdate,
            OperationBody::AttributeDelete(_) => OperationKind::AttributeDelete,
            OperationBody::AttributeFieldUpdate(_) => OperationKind::AttributeFieldUpdate,
            OperationBody::RelationshipCreate(_) => OperationKind::RelationshipCreate,
            OperationBody::RelationshipUpdate(_) => OperationKind::RelationshipUpdate,
            OperationBody::RelationshipDelete => OperationKind::RelationshipDelete,
            OperationBody::ErdImport(_) => OperationKind::ErdImport,
            OperationBody::ScreenCreate(_) => OperationKind::ScreenCreate,
            OperationBody::ScreenUpdate(_) => OperationKind::ScreenUpdate,
            OperationBody::ScreenMove(_) => OperationKind::ScreenMove,
            OperationBody::ScreenDelete => OperationKind::ScreenDelete,
            OperationBody::FlowCreate(_) => OperationKind::FlowCreate,
            OperationBody::FlowUpdate(_) => OperationKind::FlowUpdate,
            OperationBody::FlowDelete => OperationKind::FlowDelete,
            OperationBody::ScreenImport(_) => OperationKind::ScreenImport,
        }
    }
}

/// Operation discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    EntityCreate,
    EntityUpdate,
    EntityMove,
    EntityDelete,
    AttributeAdd,
    AttributeUpdate,
    AttributeDelete,
    AttributeFieldUpdate,
    RelationshipCreate,
    RelationshipUpdate,
    RelationshipDelete,
    ErdImport,
    ScreenCreate,
    ScreenUpdate,
    ScreenMove,
    ScreenDelete,
    FlowCreate,
    FlowUpdate,
    FlowDelete,
    ScreenImport,
}

impl OperationKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::EntityCreate => "ENTITY_CREATE",
            OperationKind::EntityUpdate => "ENTITY_UPDATE",
            OperationKind::EntityMove => "ENTITY_MOVE",
            OperationKind::EntityDelete => "ENTITY_DELETE",
            OperationKind::AttributeAdd => "ATTRIBUTE_ADD",
            OperationKind::AttributeUpdate => "ATTRIBUTE_UPDATE",
            OperationKind::AttributeDelete => "ATTRIBUTE_DELETE",
            OperationKind::AttributeFieldUpdate => "ATTRIBUTE_FIELD_UPDATE",
            OperationKind::RelationshipCreate => "RELATIONSHIP_CREATE",
            OperationKind::RelationshipUpdate => "RELATIONSHIP_UPDATE",
            OperationKind::RelationshipDelete => "RELATIONSHIP_DELETE",
            OperationKind::ErdImport => "ERD_IMPORT",
            OperationKind::ScreenCreate => "SCREEN_CREATE",
            OperationKind::ScreenUpdate => "SCREEN_UPDATE",
            OperationKind::ScreenMove => "SCREEN_MOVE",
            OperationKind::ScreenDelete => "SCREEN_DELETE",
            OperationKind::FlowCreate => "FLOW_CREATE",
            OperationKind::FlowUpdate => "FLOW_UPDATE",
            OperationKind::FlowDelete => "FLOW_DELETE",
            OperationKind::ScreenImport => "SCREEN_IMPORT",
        }
    }

    /// Critical operations bypass the persistence debounce and flush
    /// immediately: every delete, and whole-diagram imports.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            OperationKind::EntityDelete
                | OperationKind::AttributeDelete
                | OperationKind::RelationshipDelete
                | OperationKind::ScreenDelete
                | OperationKind::FlowDelete
                | OperationKind::ErdImport
                | OperationKind::ScreenImport
        )
    }

    /// Whether the kind addresses an existing element and therefore needs a
    /// `targetId` on the wire.
    pub fn requires_target(&self) -> bool {
        matches!(
            self,
            OperationKind::EntityUpdate
                | OperationKind::EntityMove
                | OperationKind::EntityDelete
                | OperationKind::AttributeAdd
                | OperationKind::AttributeUpdate
                | OperationKind::AttributeDelete
                | OperationKind::AttributeFieldUpdate
                | OperationKind::RelationshipUpdate
                | OperationKind::RelationshipDelete
                | OperationKind::ScreenUpdate
                | OperationKind::ScreenMove
                | OperationKind::ScreenDelete
                | OperationKind::FlowUpdate
                | OperationKind::FlowDelete
        )
    }

    /// Audit target category for history entries.
    pub fn target_type(&self) -> TargetType {
        match self {
            OperationKind::EntityCreate
            | OperationKind::EntityUpdate
            | OperationKind::EntityMove
            | OperationKind::EntityDelete
            | OperationKind::AttributeAdd
            | OperationKind::AttributeUpdate
            | OperationKind::AttributeDelete
            | OperationKind::AttributeFieldUpdate => TargetType::Entity,
            OperationKind::RelationshipCreate
            | OperationKind::RelationshipUpdate
            | OperationKind::RelationshipDelete => TargetType::Relationship,
            OperationKind::ErdImport | OperationKind::ScreenImport => TargetType::Project,
            OperationKind::ScreenCreate
            | OperationKind::ScreenUpdate
            | OperationKind::ScreenMove
            | OperationKind::ScreenDelete => TargetType::Screen,
            OperationKind::FlowCreate | OperationKind::FlowUpdate | OperationKind::FlowDelete => {
                TargetType::Flow
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit target category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetType {
    Entity,
    Relationship,
    Project,
    Screen,
    Flow,
}

/// An edit request from a client, applied atomically on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Client-generated unique operation id.
    pub id: String,
    /// Discriminator and payload (`type` + `payload` on the wire).
    #[serde(flatten)]
    pub body: OperationBody,
    /// Element the operation addresses, when the kind needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Sender's Lamport clock when the operation was produced.
    #[serde(default)]
    pub lamport_clock: u64,
    /// Sender wall time in milliseconds.
    #[serde(default)]
    pub wall_clock: u64,
    /// Author identity; "anonymous" when the session never authenticated.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Optional inverse for client-side undo; carried opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<serde_json::Value>,
}

impl Operation {
    /// Returns the operation discriminator.
    pub fn kind(&self) -> OperationKind {
        self.body.kind()
    }

    /// Checks the structural requirements the type system cannot express.
    pub fn validate(&self) -> CoreResult<()> {
        let kind = self.kind();
        if kind.requires_target() && self.target_id.as_deref().unwrap_or("").is_empty() {
            return Err(CoreError::MissingTarget {
                id: self.id.clone(),
                kind,
            });
        }
        Ok(())
    }
}
