//! Diagram data model: snapshots, entities, relationships, screens and flows.
//!
//! Field names follow the client wire format (camelCase, with the historical
//! `isPK`/`isFK` spellings) so the same types serve as both the in-memory
//! representation and the JSON payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 2D canvas position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Client viewport, attached to cursor updates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

/// Column of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(rename = "isPK")]
    pub is_pk: bool,
    #[serde(rename = "isFK")]
    pub is_fk: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_val: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

/// Partial attribute update used by ATTRIBUTE_FIELD_UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(rename = "isPK", skip_serializing_if = "Option::is_none")]
    pub is_pk: Option<bool>,
    #[serde(rename = "isFK", skip_serializing_if = "Option::is_none")]
    pub is_fk: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_val: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
}

impl AttributePatch {
    /// Shallow-merges the set fields into `attribute`.
    pub fn merge_into(&self, attribute: &mut Attribute) {
        if let Some(name) = &self.name {
            attribute.name = name.clone();
        }
        if let Some(data_type) = &self.data_type {
            attribute.data_type = data_type.clone();
        }
        if let Some(is_pk) = self.is_pk {
            attribute.is_pk = is_pk;
        }
        if let Some(is_fk) = self.is_fk {
            attribute.is_fk = is_fk;
        }
        if let Some(is_nullable) = self.is_nullable {
            attribute.is_nullable = Some(is_nullable);
        }
        if let Some(default_val) = &self.default_val {
            attribute.default_val = Some(default_val.clone());
        }
        if let Some(comment) = &self.comment {
            attribute.comment = Some(comment.clone());
        }
        if let Some(length) = &self.length {
            attribute.length = Some(length.clone());
        }
    }
}

/// Entity table on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Partial entity update used by ENTITY_UPDATE and ENTITY_MOVE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<Attribute>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl EntityPatch {
    /// Shallow-merges the set fields into `entity`.
    pub fn merge_into(&self, entity: &mut Entity) {
        if let Some(name) = &self.name {
            entity.name = name.clone();
        }
        if let Some(position) = self.position {
            entity.position = position;
        }
        if let Some(attributes) = &self.attributes {
            entity.attributes = attributes.clone();
        }
        if let Some(is_locked) = self.is_locked {
            entity.is_locked = Some(is_locked);
        }
        if let Some(comment) = &self.comment {
            entity.comment = Some(comment.clone());
        }
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:M")]
    ManyToMany,
}

/// Edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type")]
    pub kind: RelationKind,
}

/// Partial relationship update used by RELATIONSHIP_UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelationKind>,
}

impl RelationshipPatch {
    /// Shallow-merges the set fields into `relationship`.
    pub fn merge_into(&self, relationship: &mut Relationship) {
        if let Some(source) = &self.source {
            relationship.source = source.clone();
        }
        if let Some(target) = &self.target {
            relationship.target = target.clone();
        }
        if let Some(source_handle) = &self.source_handle {
            relationship.source_handle = Some(source_handle.clone());
        }
        if let Some(target_handle) = &self.target_handle {
            relationship.target_handle = Some(target_handle.clone());
        }
        if let Some(kind) = self.kind {
            relationship.kind = kind;
        }
    }
}

/// Screen of a linked screen-design diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial screen update used by SCREEN_UPDATE and SCREEN_MOVE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ScreenPatch {
    /// Shallow-merges the set fields into `screen`.
    pub fn merge_into(&self, screen: &mut Screen) {
        if let Some(name) = &self.name {
            screen.name = name.clone();
        }
        if let Some(position) = self.position {
            screen.position = position;
        }
        if let Some(description) = &self.description {
            screen.description = Some(description.clone());
        }
    }
}

/// Navigation edge between two screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Partial flow update used by FLOW_UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowPatch {
    /// Shallow-merges the set fields into `flow`.
    pub fn merge_into(&self, flow: &mut Flow) {
        if let Some(source) = &self.source {
            flow.source = source.clone();
        }
        if let Some(target) = &self.target {
            flow.target = target.clone();
        }
        if let Some(source_handle) = &self.source_handle {
            flow.source_handle = Some(source_handle.clone());
        }
        if let Some(target_handle) = &self.target_handle {
            flow.target_handle = Some(target_handle.clone());
        }
        if let Some(label) = &self.label {
            flow.label = Some(label.clone());
        }
    }
}

/// Authoritative value of a diagram at a version.
///
/// Sequences keep insertion order; the order is externally observable and is
/// preserved through persistence round trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub screens: Vec<Screen>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Creates an empty snapshot at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Looks up an entity by id, mutably.
    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.id == id)
    }

    /// Looks up a relationship by id, mutably.
    pub fn relationship_mut(&mut self, id: &str) -> Option<&mut Relationship> {
        self.relationships.iter_mut().find(|r| r.id == id)
    }

    /// Looks up a screen by id, mutably.
    pub fn screen_mut(&mut self, id: &str) -> Option<&mut Screen> {
        self.screens.iter_mut().find(|s| s.id == id)
    }

    /// Looks up a flow by id, mutably.
    pub fn flow_mut(&mut self, id: &str) -> Option<&mut Flow> {
        self.flows.iter_mut().find(|f| f.id == id)
    }

    /// Whether an entity with `id` exists.
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }

    /// Whether an entity with `name` exists, compared case-insensitively.
    pub fn has_entity_named(&self, name: &str) -> bool {
        self.entities
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Whether a relationship with `id` exists.
    pub fn has_relationship(&self, id: &str) -> bool {
        self.relationships.iter().any(|r| r.id == id)
    }

    /// Whether a screen with `id` exists.
    pub fn has_screen(&self, id: &str) -> bool {
        self.screens.iter().any(|s| s.id == id)
    }

    /// Whether a screen with `name` exists, compared case-insensitively.
    pub fn has_screen_named(&self, name: &str) -> bool {
        self.screens
            .iter()
            .any(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Whether a flow with `id` exists.
    pub fn has_flow(&self, id: &str) -> bool {
        self.flows.iter().any(|f| f.id == id)
    }

    /// Drops relationships whose endpoints no longer reference a live entity,
    /// and flows whose endpoints no longer reference a live screen.
    pub fn prune_orphans(&mut self) {
        let entity_ids: std::collections::HashSet<&str> =
            self.entities.iter().map(|e| e.id.as_str()).collect();
        self.relationships.retain(|r| {
            entity_ids.contains(r.source.as_str()) && entity_ids.contains(r.target.as_str())
        });

        let screen_ids: std::collections::HashSet<&str> =
            self.screens.iter().map(|s| s.id.as_str()).collect();
        self.flows.retain(|f| {
            screen_ids.contains(f.source.as_str()) && screen_ids.contains(f.target.as_str())
        });
    }
}
