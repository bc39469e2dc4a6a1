use roster_core::db::{open_db, open_db_with_timeout};
use roster_core::store::{Filter, Patch};
use roster_core::{
    CanonicalId, DocumentStore, MembershipReconciler, SqliteDocumentStore, StoreGroupRepository,
    StoreMemberRepository,
};
use serde_json::{json, Value};
use std::path::Path;
use std::thread;
use std::time::Duration;

const MEMBERS: &str = "students";
const GROUPS: &str = "batches";

fn id(raw: &str) -> CanonicalId {
    CanonicalId::parse(raw).unwrap()
}

fn seed(path: &Path) {
    let conn = open_db(path).unwrap();
    let store = SqliteDocumentStore::new(&conn);
    for (collection, value) in [
        (GROUPS, json!({ "_id": "B1", "name": "Morning", "member_ids": [] })),
        (MEMBERS, json!({ "_id": "S1", "role": "student", "group_id": "B1" })),
    ] {
        store
            .insert_one(collection, value.as_object().cloned().unwrap())
            .unwrap();
    }
}

#[test]
fn locked_store_surfaces_transient_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");
    seed(&path);

    let conn = open_db_with_timeout(&path, Duration::from_millis(50)).unwrap();
    let holder = open_db(&path).unwrap();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let store = SqliteDocumentStore::new(&conn);
    let update = store
        .update_one(GROUPS, &Filter::by_id(id("B1")), &Patch::new().set("name", "Evening"))
        .unwrap_err();
    assert!(update.is_transient(), "{update}");
    let find = store.find(GROUPS, &Filter::All).unwrap_err();
    assert!(find.is_transient(), "{find}");

    let reconciler = MembershipReconciler::new(
        StoreMemberRepository::new(&store, MEMBERS),
        StoreGroupRepository::new(&store, GROUPS),
        "student",
    );
    let err = reconciler.reconcile_all().unwrap_err();
    assert!(err.is_transient(), "{err}");

    holder.execute_batch("ROLLBACK;").unwrap();
    let report = reconciler.reconcile_all().unwrap();
    assert_eq!(report.writes, 1);
}

#[test]
fn concurrent_patches_to_one_document_are_not_lost() {
    const ROUNDS: i64 = 50;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.db");
    seed(&path);

    let connections = [open_db(&path).unwrap(), open_db(&path).unwrap()];
    thread::scope(|scope| {
        for (conn, field) in connections.into_iter().zip(["left", "right"]) {
            scope.spawn(move || {
                let store = SqliteDocumentStore::new(&conn);
                for round in 0..ROUNDS {
                    store
                        .update_one(GROUPS, &Filter::by_id(id("B1")), &Patch::new().set(field, round))
                        .unwrap();
                }
            });
        }
    });

    let conn = open_db(&path).unwrap();
    let store = SqliteDocumentStore::new(&conn);
    let group = store.find_one(GROUPS, &Filter::by_id(id("B1"))).unwrap().unwrap();
    assert_eq!(group.get("left"), Some(&Value::from(ROUNDS - 1)));
    assert_eq!(group.get("right"), Some(&Value::from(ROUNDS - 1)));
    assert_eq!(store.write_count(GROUPS, &id("B1")).unwrap(), Some(2 * ROUNDS as u64));
}
