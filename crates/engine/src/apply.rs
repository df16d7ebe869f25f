//! Pure snapshot transition function.
//!
//! `apply` is deterministic and side-effect free; its result is the only
//! authoritative outcome of an operation. The operation pipeline serializes
//! calls per diagram, so no concurrency exists at this level.

use boardsync_core::{Operation, OperationBody, Snapshot};

/// Applies one operation to a snapshot, producing the successor snapshot.
///
/// Semantic no-ops (creating an existing id, addressing a missing target)
/// still advance the version: every valid receipt counts one step.
/// Afterwards the structural invariants are re-enforced by pruning orphaned
/// relationships and flows.
pub fn apply(mut snapshot: Snapshot, operation: &Operation) -> Snapshot {
    apply_body(&mut snapshot, operation);
    snapshot.version += 1;
    snapshot.prune_orphans();
    snapshot
}

fn apply_body(snapshot: &mut Snapshot, operation: &Operation) {
    let target_id = operation.target_id.as_deref().unwrap_or("");
    match &operation.body {
        OperationBody::EntityCreate(entity) => {
            if !snapshot.has_entity(&entity.id) {
                snapshot.entities.push(entity.clone());
            }
        }
        OperationBody::EntityUpdate(patch) => {
            if let Some(entity) = snapshot.entity_mut(target_id) {
                patch.merge_into(entity);
            }
        }
        OperationBody::EntityMove(payload) => {
            if let Some(entity) = snapshot.entity_mut(target_id) {
                entity.position = payload.position;
            }
        }
        OperationBody::EntityDelete => {
            snapshot.entities.retain(|e| e.id != target_id);
            snapshot
                .relationships
                .retain(|r| r.source != target_id && r.target != target_id);
        }
        OperationBody::AttributeAdd(payload)
        | OperationBody::AttributeUpdate(payload)
        | OperationBody::AttributeDelete(payload) => {
            if let Some(entity) = snapshot.entity_mut(target_id) {
                entity.attributes = payload.attributes.clone();
            }
        }
        OperationBody::AttributeFieldUpdate(payload) => {
            if let Some(entity) = snapshot.entity_mut(target_id) {
                if let Some(attribute) = entity
                    .attributes
                    .iter_mut()
                    .find(|a| a.id == payload.attr_id)
                {
                    payload.updates.merge_into(attribute);
                }
            }
        }
        OperationBody::RelationshipCreate(relationship) => {
            if !snapshot.has_relationship(&relationship.id) {
                snapshot.relationships.push(relationship.clone());
            }
        }
        OperationBody::RelationshipUpdate(patch) => {
            if let Some(relationship) = snapshot.relationship_mut(target_id) {
                patch.merge_into(relationship);
            }
        }
        OperationBody::RelationshipDelete => {
            snapshot.relationships.retain(|r| r.id != target_id);
        }
        OperationBody::ErdImport(payload) => {
            if payload.overwrite {
                snapshot.entities = payload.entities.clone();
                snapshot.relationships = payload.relationships.clone();
            } else {
                for entity in &payload.entities {
                    if !snapshot.has_entity_named(&entity.name) {
                        snapshot.entities.push(entity.clone());
                    }
                }
                for relationship in &payload.relationships {
                    if !snapshot.has_relationship(&relationship.id) {
                        snapshot.relationships.push(relationship.clone());
                    }
                }
            }
        }
        OperationBody::ScreenCreate(screen) => {
            if !snapshot.has_screen(&screen.id) {
                snapshot.screens.push(screen.clone());
            }
        }
        OperationBody::ScreenUpdate(patch) => {
            if let Some(screen) = snapshot.screen_mut(target_id) {
                patch.merge_into(screen);
            }
        }
        OperationBody::ScreenMove(payload) => {
            if let Some(screen) = snapshot.screen_mut(target_id) {
                screen.position = payload.position;
            }
        }
        OperationBody::ScreenDelete => {
            snapshot.screens.retain(|s| s.id != target_id);
            snapshot
                .flows
                .retain(|f| f.source != target_id && f.target != target_id);
        }
        OperationBody::FlowCreate(flow) => {
            if !snapshot.has_flow(&flow.id) {
                snapshot.flows.push(flow.clone());
            }
        }
        OperationBody::FlowUpdate(patch) => {
            if let Some(flow) = snapshot.flow_mut(target_id) {
                patch.merge_into(flow);
            }
        }
        OperationBody::FlowDelete => {
            snapshot.flows.retain(|f| f.id != target_id);
        }
        OperationBody::ScreenImport(payload) => {
            if payload.overwrite {
                snapshot.screens = payload.screens.clone();
                snapshot.flows = payload.flows.clone();
            } else {
                for screen in &payload.screens {
                    if !snapshot.has_screen_named(&screen.name) {
                        snapshot.screens.push(screen.clone());
                    }
                }
                for flow in &payload.flows {
                    if !snapshot.has_flow(&flow.id) {
                        snapshot.flows.push(flow.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync_core::{
        Attribute, AttributeFieldPayload, AttributeListPayload, AttributePatch, Entity,
        EntityPatch, ErdImportPayload, Flow, MovePayload, Position, RelationKind, Relationship,
        Screen, ScreenImportPayload,
    };

    fn entity(id: &str, name: &str) -> Entity {
        Entity {
            id: id.to_string(),
            name: name.to_string(),
            position: Position::default(),
            attributes: Vec::new(),
            is_locked: None,
            comment: None,
        }
    }

    fn attribute(id: &str, name: &str) -> Attribute {
        Attribute {
            id: id.to_string(),
            name: name.to_string(),
            data_type: "INT".into(),
            is_pk: false,
            is_fk: false,
            is_nullable: None,
            default_val: None,
            comment: None,
            length: None,
        }
    }

    fn relationship(id: &str, source: &str, target: &str) -> Relationship {
        Relationship {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
            target_handle: None,
            kind: RelationKind::OneToMany,
        }
    }

    fn screen(id: &str, name: &str) -> Screen {
        Screen {
            id: id.to_string(),
            name: name.to_string(),
            position: Position::default(),
            description: None,
        }
    }

    fn flow(id: &str, source: &str, target: &str) -> Flow {
        Flow {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: None,
            target_handle: None,
            label: None,
        }
    }

    fn op(body: OperationBody, target: Option<&str>) -> Operation {
        op_with_clock(body, target, 1, 1)
    }

    fn op_with_clock(
        body: OperationBody,
        target: Option<&str>,
        lamport: u64,
        wall: u64,
    ) -> Operation {
        Operation {
            id: format!("op-{lamport}-{wall}"),
            body,
            target_id: target.map(str::to_string),
            lamport_clock: lamport,
            wall_clock: wall,
            user_id: "u1".into(),
            user_name: "Ada".into(),
            previous_state: None,
        }
    }

    #[test]
    fn create_appends_in_order_and_bumps_version() {
        let mut snap = Snapshot::empty();
        for (i, name) in ["users", "orders", "items"].iter().enumerate() {
            snap = apply(
                snap,
                &op(
                    OperationBody::EntityCreate(entity(&format!("e{i}"), name)),
                    None,
                ),
            );
        }
        assert_eq!(snap.version, 3);
        let names: Vec<&str> = snap.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["users", "orders", "items"]);
    }

    #[test]
    fn create_with_existing_id_is_a_noop_but_still_advances_version() {
        let snap = apply(
            Snapshot::empty(),
            &op(OperationBody::EntityCreate(entity("e1", "users")), None),
        );
        let snap = apply(
            snap,
            &op(OperationBody::EntityCreate(entity("e1", "imposter")), None),
        );
        assert_eq!(snap.version, 2);
        assert_eq!(snap.entities.len(), 1);
        assert_eq!(snap.entities[0].name, "users");
    }

    #[test]
    fn update_of_missing_target_is_a_noop() {
        let snap = apply(
            Snapshot::empty(),
            &op(
                OperationBody::EntityUpdate(EntityPatch {
                    name: Some("ghost".into()),
                    ..Default::default()
                }),
                Some("nope"),
            ),
        );
        assert_eq!(snap.version, 1);
        assert!(snap.entities.is_empty());
    }

    #[test]
    fn back_to_back_moves_leave_the_later_position() {
        let mut snap = Snapshot {
            entities: vec![entity("e1", "users")],
            ..Default::default()
        };
        snap = apply(
            snap,
            &op_with_clock(
                OperationBody::EntityMove(MovePayload {
                    position: Position { x: 10.0, y: 0.0 },
                }),
                Some("e1"),
                5,
                1000,
            ),
        );
        snap = apply(
            snap,
            &op_with_clock(
                OperationBody::EntityMove(MovePayload {
                    position: Position { x: 20.0, y: 0.0 },
                }),
                Some("e1"),
                5,
                1001,
            ),
        );
        assert_eq!(snap.version, 2);
        assert_eq!(snap.entities[0].position, Position { x: 20.0, y: 0.0 });
    }

    #[test]
    fn entity_delete_cascades_to_relationships() {
        let snap = Snapshot {
            entities: vec![entity("e1", "users"), entity("e2", "orders")],
            relationships: vec![relationship("r1", "e1", "e2")],
            ..Default::default()
        };
        let snap = apply(snap, &op(OperationBody::EntityDelete, Some("e1")));
        assert_eq!(snap.entities.len(), 1);
        assert_eq!(snap.entities[0].id, "e2");
        assert!(snap.relationships.is_empty());
    }

    #[test]
    fn delete_is_idempotent_and_absorbs_later_ops_on_the_target() {
        let base = Snapshot {
            entities: vec![entity("e1", "users")],
            ..Default::default()
        };
        let deleted = apply(base, &op(OperationBody::EntityDelete, Some("e1")));
        let deleted_again = apply(deleted.clone(), &op(OperationBody::EntityDelete, Some("e1")));
        let moved_after = apply(
            deleted.clone(),
            &op(
                OperationBody::EntityMove(MovePayload {
                    position: Position { x: 9.0, y: 9.0 },
                }),
                Some("e1"),
            ),
        );

        assert!(deleted_again.entities.is_empty());
        assert!(moved_after.entities.is_empty());
        assert_eq!(deleted_again.entities, moved_after.entities);
    }

    #[test]
    fn attribute_list_ops_replace_the_whole_list() {
        let mut base_entity = entity("e1", "users");
        base_entity.attributes = vec![attribute("a1", "id")];
        let snap = Snapshot {
            entities: vec![base_entity],
            ..Default::default()
        };

        let snap = apply(
            snap,
            &op(
                OperationBody::AttributeUpdate(AttributeListPayload {
                    attributes: vec![attribute("a1", "id"), attribute("a2", "email")],
                }),
                Some("e1"),
            ),
        );
        assert_eq!(snap.entities[0].attributes.len(), 2);
        assert_eq!(snap.entities[0].attributes[1].name, "email");
    }

    #[test]
    fn attribute_field_update_patches_one_attribute() {
        let mut base_entity = entity("e1", "users");
        base_entity.attributes = vec![attribute("a1", "id"), attribute("a2", "email")];
        let snap = Snapshot {
            entities: vec![base_entity],
            ..Default::default()
        };

        let snap = apply(
            snap,
            &op(
                OperationBody::AttributeFieldUpdate(AttributeFieldPayload {
                    attr_id: "a2".into(),
                    updates: AttributePatch {
                        name: Some("email_address".into()),
                        is_nullable: Some(true),
                        ..Default::default()
                    },
                }),
                Some("e1"),
            ),
        );
        let attrs = &snap.entities[0].attributes;
        assert_eq!(attrs[0].name, "id");
        assert_eq!(attrs[1].name, "email_address");
        assert_eq!(attrs[1].is_nullable, Some(true));
        assert_eq!(attrs[1].data_type, "INT");
    }

    #[test]
    fn relationship_create_requires_live_endpoints() {
        let snap = Snapshot {
            entities: vec![entity("e1", "users")],
            ..Default::default()
        };
        // Target endpoint does not exist; the orphan filter removes it.
        let snap = apply(
            snap,
            &op(
                OperationBody::RelationshipCreate(relationship("r1", "e1", "missing")),
                None,
            ),
        );
        assert_eq!(snap.version, 1);
        assert!(snap.relationships.is_empty());
    }

    #[test]
    fn erd_import_overwrite_replaces_wholesale() {
        let snap = Snapshot {
            entities: vec![entity("e1", "legacy")],
            relationships: vec![relationship("r1", "e1", "e1")],
            ..Default::default()
        };
        let snap = apply(
            snap,
            &op(
                OperationBody::ErdImport(ErdImportPayload {
                    overwrite: true,
                    entities: vec![entity("n1", "users"), entity("n2", "orders")],
                    relationships: vec![relationship("nr1", "n1", "n2")],
                }),
                None,
            ),
        );
        assert_eq!(snap.entities.len(), 2);
        assert_eq!(snap.relationships.len(), 1);
        assert!(!snap.has_entity("e1"));
    }

    #[test]
    fn erd_import_merge_dedups_by_name_and_relationship_id() {
        let snap = Snapshot {
            entities: vec![entity("e1", "Users")],
            relationships: vec![relationship("r1", "e1", "e1")],
            ..Default::default()
        };
        let snap = apply(
            snap,
            &op(
                OperationBody::ErdImport(ErdImportPayload {
                    overwrite: false,
                    entities: vec![entity("n1", "users"), entity("n2", "orders")],
                    relationships: vec![
                        relationship("r1", "e1", "e1"),
                        relationship("r2", "e1", "n2"),
                    ],
                }),
                None,
            ),
        );
        // "users" already present (case-insensitive), "orders" is new.
        assert_eq!(snap.entities.len(), 2);
        assert!(snap.has_entity("n2"));
        assert!(!snap.has_entity("n1"));
        // r1 already present, r2 is new.
        assert_eq!(snap.relationships.len(), 2);
    }

    #[test]
    fn screen_delete_cascades_to_flows() {
        let snap = Snapshot {
            screens: vec![screen("s1", "Home"), screen("s2", "Detail")],
            flows: vec![flow("f1", "s1", "s2"), flow("f2", "s2", "s2")],
            ..Default::default()
        };
        let snap = apply(snap, &op(OperationBody::ScreenDelete, Some("s1")));
        assert_eq!(snap.screens.len(), 1);
        assert_eq!(snap.flows.len(), 1);
        assert_eq!(snap.flows[0].id, "f2");
    }

    #[test]
    fn screen_import_merge_mirrors_erd_semantics() {
        let snap = Snapshot {
            screens: vec![screen("s1", "Home")],
            ..Default::default()
        };
        let snap = apply(
            snap,
            &op(
                OperationBody::ScreenImport(ScreenImportPayload {
                    overwrite: false,
                    screens: vec![screen("x1", "home"), screen("x2", "Checkout")],
                    flows: vec![flow("f1", "s1", "x2")],
                }),
                None,
            ),
        );
        assert_eq!(snap.screens.len(), 2);
        assert!(snap.has_screen("x2"));
        assert!(!snap.has_screen("x1"));
        assert_eq!(snap.flows.len(), 1);
    }

    #[test]
    fn version_counts_every_applied_op() {
        let ops = vec![
            op(OperationBody::EntityCreate(entity("e1", "users")), None),
            op(OperationBody::EntityDelete, Some("missing")),
            op(
                OperationBody::EntityUpdate(EntityPatch::default()),
                Some("e1"),
            ),
        ];
        let mut snap = Snapshot::empty();
        for o in &ops {
            snap = apply(snap, o);
        }
        assert_eq!(snap.version, ops.len() as u64);
    }

    #[test]
    fn no_sequence_of_ops_leaves_orphans() {
        let mut snap = Snapshot::empty();
        let script = vec![
            op(OperationBody::EntityCreate(entity("e1", "users")), None),
            op(OperationBody::EntityCreate(entity("e2", "orders")), None),
            op(
                OperationBody::RelationshipCreate(relationship("r1", "e1", "e2")),
                None,
            ),
            op(
                OperationBody::RelationshipCreate(relationship("r2", "e2", "e2")),
                None,
            ),
            op(OperationBody::EntityDelete, Some("e2")),
            op(OperationBody::EntityCreate(entity("e3", "items")), None),
        ];
        for o in &script {
            snap = apply(snap, o);
            for r in &snap.relationships {
                assert!(snap.has_entity(&r.source) && snap.has_entity(&r.target));
            }
            for f in &snap.flows {
                assert!(snap.has_screen(&f.source) && snap.has_screen(&f.target));
            }
        }
        assert_eq!(snap.entities.len(), 2);
        assert!(snap.relationships.is_empty());
    }
}
