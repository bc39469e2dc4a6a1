use roster_core::db::open_db_in_memory;
use roster_core::service::eligibility_service::MembershipSource;
use roster_core::{
    CanonicalId, DocumentStore, EligibilityResolver, ItemRepository, ItemStatus, Member,
    MemberRepository, MembershipReconciler, SqliteDocumentStore,
    StoreGroupRepository, StoreItemRepository, StoreMemberRepository,
};
use serde_json::{json, Value};

const MEMBERS: &str = "students";
const GROUPS: &str = "batches";
const ITEMS: &str = "assessments";

fn id(raw: &str) -> CanonicalId {
    CanonicalId::parse(raw).unwrap()
}

fn seed(store: &SqliteDocumentStore<'_>, collection: &str, value: Value) {
    store
        .insert_one(collection, value.as_object().cloned().unwrap())
        .unwrap();
}

fn resolver<'a>(
    store: &'a SqliteDocumentStore<'a>,
) -> EligibilityResolver<
    StoreGroupRepository<'a, SqliteDocumentStore<'a>>,
    StoreItemRepository<'a, SqliteDocumentStore<'a>>,
> {
    EligibilityResolver::new(
        StoreGroupRepository::new(store, GROUPS),
        StoreItemRepository::new(store, ITEMS),
    )
}

fn member(store: &SqliteDocumentStore<'_>, raw: &str) -> Member {
    StoreMemberRepository::new(store, MEMBERS)
        .get_member(&id(raw))
        .unwrap()
        .unwrap()
}

fn item_ids(items: &[roster_core::Item]) -> Vec<String> {
    items.iter().map(|item| item.id.to_string()).collect()
}

fn seed_published_assessment(store: &SqliteDocumentStore<'_>) {
    seed(store, GROUPS, json!({ "_id": "B2", "name": "Evening", "member_ids": ["S1"] }));
    seed(store, MEMBERS, json!({ "_id": "S1", "role": "student", "group_id": "B2" }));
    seed(
        store,
        ITEMS,
        json!({ "_id": "A1", "title": "Quiz", "groups": ["B2"], "is_active": true, "status": "published", "created_at": 10 }),
    );
}

#[test]
fn published_item_is_visible_until_moved_back_to_draft() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    let student = member(&store, "S1");
    let service = resolver(&store);

    let visible = service.eligible_items(&student).unwrap();
    assert_eq!(item_ids(&visible), vec!["A1"]);

    StoreItemRepository::new(&store, ITEMS)
        .set_status(&id("A1"), ItemStatus::Draft)
        .unwrap();
    assert!(service.eligible_items(&student).unwrap().is_empty());
}

#[test]
fn inactive_or_archived_items_are_hidden() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A2", "groups": ["B2"], "is_active": false, "status": "active", "created_at": 20 }),
    );
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A3", "groups": ["B2"], "is_active": true, "status": "archived", "created_at": 30 }),
    );
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A4", "groups": ["B2"], "is_active": true, "created_at": 40 }),
    );

    let visible = resolver(&store).eligible_items(&member(&store, "S1")).unwrap();
    assert_eq!(item_ids(&visible), vec!["A1"]);
}

#[test]
fn cache_membership_is_preferred() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);

    let resolution = resolver(&store).resolve(&member(&store, "S1")).unwrap();
    assert_eq!(resolution.source, MembershipSource::Cache);
    assert_eq!(resolution.group_ids.into_iter().collect::<Vec<_>>(), vec![id("B2")]);
}

#[test]
fn empty_cache_falls_back_to_group_pointer() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, GROUPS, json!({ "_id": "B2", "name": "Evening", "member_ids": [] }));
    seed(&store, MEMBERS, json!({ "_id": "S1", "role": "student", "group_id": "B2" }));
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A1", "groups": ["B2"], "is_active": true, "status": "active" }),
    );

    let resolution = resolver(&store).resolve(&member(&store, "S1")).unwrap();
    assert_eq!(resolution.source, MembershipSource::GroupPointer);
    assert_eq!(item_ids(&resolution.items), vec!["A1"]);
}

#[test]
fn member_without_any_group_sees_nothing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    seed(&store, MEMBERS, json!({ "_id": "S7", "role": "student", "group_id": null }));

    let resolution = resolver(&store).resolve(&member(&store, "S7")).unwrap();
    assert_eq!(resolution.source, MembershipSource::None);
    assert!(resolution.group_ids.is_empty());
    assert!(resolution.items.is_empty());
}

#[test]
fn stale_cache_is_corrected_by_reconciliation() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed(&store, GROUPS, json!({ "_id": "B1", "name": "Morning", "member_ids": ["S1"] }));
    seed(&store, GROUPS, json!({ "_id": "B2", "name": "Evening", "member_ids": [] }));
    seed(&store, MEMBERS, json!({ "_id": "S1", "role": "student", "group_id": "B2" }));
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A1", "groups": ["B1"], "is_active": true, "status": "published" }),
    );
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A2", "groups": ["B2"], "is_active": true, "status": "published" }),
    );
    let service = resolver(&store);

    let before = service.eligible_items(&member(&store, "S1")).unwrap();
    assert_eq!(item_ids(&before), vec!["A1"]);

    MembershipReconciler::new(
        StoreMemberRepository::new(&store, MEMBERS),
        StoreGroupRepository::new(&store, GROUPS),
        "student",
    )
    .reconcile_all()
    .unwrap();

    let after = service.eligible_items(&member(&store, "S1")).unwrap();
    assert_eq!(item_ids(&after), vec!["A2"]);
}

#[test]
fn mixed_identifier_encodings_resolve_to_the_same_group() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    let group_hex = "66fa1b2c3d4e5f6a7b8c9d0e";
    seed(
        &store,
        GROUPS,
        json!({ "_id": { "$oid": group_hex }, "name": "Evening", "member_ids": ["S1"] }),
    );
    seed(
        &store,
        MEMBERS,
        json!({ "_id": "S1", "role": "student", "group_id": { "$oid": group_hex } }),
    );
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A1", "groups": [group_hex.to_uppercase()], "is_active": true, "status": "active" }),
    );
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A2", "groups": [{ "$oid": group_hex }], "is_active": true, "status": "active" }),
    );

    let visible = resolver(&store).eligible_items(&member(&store, "S1")).unwrap();
    assert_eq!(visible.len(), 2);
}

#[test]
fn adding_a_group_to_an_item_only_grows_visibility() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A2", "groups": ["B9"], "is_active": true, "status": "active", "created_at": 20 }),
    );
    let student = member(&store, "S1");
    let service = resolver(&store);
    let before = service.eligible_items(&student).unwrap();

    store
        .update_one(
            ITEMS,
            &roster_core::store::Filter::by_id(id("A2")),
            &roster_core::store::Patch::new().set("groups", json!(["B9", "B2"])),
        )
        .unwrap();
    let after = service.eligible_items(&student).unwrap();

    assert!(before.iter().all(|item| after.contains(item)));
    assert_eq!(item_ids(&after), vec!["A2", "A1"]);
}

#[test]
fn malformed_matched_item_is_skipped_without_hiding_others() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A2", "groups": ["B2", 17], "is_active": true, "status": "active" }),
    );

    let resolution = resolver(&store).resolve(&member(&store, "S1")).unwrap();
    assert_eq!(item_ids(&resolution.items), vec!["A1"]);
    assert_eq!(resolution.skipped.len(), 1);
    assert_eq!(resolution.skipped[0].collection, ITEMS);
    assert!(resolution.skipped[0].document.contains("A2"));
}

#[test]
fn deactivating_an_item_only_affects_its_groups() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::new(&conn);
    seed_published_assessment(&store);
    seed(&store, GROUPS, json!({ "_id": "B3", "name": "Weekend", "member_ids": ["S3"] }));
    seed(&store, MEMBERS, json!({ "_id": "S3", "role": "student", "group_id": "B3" }));
    seed(
        &store,
        ITEMS,
        json!({ "_id": "A3", "groups": ["B3"], "is_active": true, "status": "published", "created_at": 5 }),
    );
    let service = resolver(&store);
    let b2_member = member(&store, "S1");
    let b3_member = member(&store, "S3");
    let b3_before = service.eligible_items(&b3_member).unwrap();
    assert_eq!(item_ids(&service.eligible_items(&b2_member).unwrap()), vec!["A1"]);

    StoreItemRepository::new(&store, ITEMS)
        .set_active(&id("A1"), false)
        .unwrap();

    assert!(service.eligible_items(&b2_member).unwrap().is_empty());
    assert_eq!(service.eligible_items(&b3_member).unwrap(), b3_before);
    assert_eq!(item_ids(&b3_before), vec!["A3"]);
}
