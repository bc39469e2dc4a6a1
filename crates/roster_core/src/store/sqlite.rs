//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON documents per collection in the `documents` table.
//! - Evaluate `Filter` predicates with canonical identifier semantics.
//!
//! # Invariants
//! - `doc_key` is the canonical `_id`, unique per collection, so the two
//!   identifier encodings can never produce two copies of one document.
//! - Results are returned in insertion order (`id ASC`).
//! - Each `update_one` reads and rewrites its row inside one `BEGIN IMMEDIATE`
//!   transaction, so concurrent patches to one document are serialized.

use crate::model::decode::Document;
use crate::model::identifier::{canonicalize, CanonicalId, IdentifierError};
use crate::store::{DocumentStore, Filter, Patch, StoreError, StoreResult, UpdateOutcome, ID_FIELD};
use log::{debug, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;
use std::time::Instant;

/// Stored row: internal rowid plus parsed body.
struct Row {
    id: i64,
    body: Document,
}

/// Document store over a migrated SQLite connection.
pub struct SqliteDocumentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentStore<'conn> {
    /// Wraps a connection returned by `open_db*`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Number of effective writes applied to one document by `update_one`.
    pub fn write_count(&self, collection: &str, id: &CanonicalId) -> StoreResult<Option<u64>> {
        self.conn
            .query_row(
                "SELECT write_count FROM documents WHERE collection = ?1 AND doc_key = ?2;",
                params![collection, id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|count| count.map(|value| value.max(0) as u64))
            .map_err(|err| StoreError::classify("write_count", err))
    }

    fn load_rows(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Row>> {
        let started_at = Instant::now();
        let raw_rows = match filter.primary_key() {
            Some(key) => self.select_by_key(collection, key)?,
            None => self.select_collection(collection)?,
        };

        let mut rows = Vec::new();
        for (id, body_text) in raw_rows {
            let body = parse_body(collection, id, &body_text)?;
            if filter.matches(&body) {
                rows.push(Row { id, body });
            }
        }

        debug!(
            "event=store_find module=store status=ok collection={} matched={} duration_ms={}",
            collection,
            rows.len(),
            started_at.elapsed().as_millis()
        );
        Ok(rows)
    }

    fn select_collection(&self, collection: &str) -> StoreResult<Vec<(i64, String)>> {
        let classify = |err: rusqlite::Error| StoreError::classify("find", err);
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id ASC;")
            .map_err(classify)?;
        let rows = stmt
            .query_map([collection], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(classify)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(classify)
    }

    fn select_by_key(&self, collection: &str, key: &CanonicalId) -> StoreResult<Vec<(i64, String)>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, body FROM documents WHERE collection = ?1 AND doc_key = ?2;",
                params![collection, key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| StoreError::classify("find", err))?;
        Ok(row.into_iter().collect())
    }
}

impl DocumentStore for SqliteDocumentStore<'_> {
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .load_rows(collection, filter)?
            .into_iter()
            .map(|row| row.body)
            .collect())
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self
            .load_rows(collection, filter)?
            .into_iter()
            .next()
            .map(|row| row.body))
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> StoreResult<UpdateOutcome> {
        if patch.is_empty() {
            return Err(StoreError::InvalidPatch("patch has no fields"));
        }
        if patch.touches_id() {
            return Err(StoreError::InvalidPatch("`_id` cannot be updated"));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| update_failed(collection, err))?;

        let Some(Row { id, mut body }) = self.load_rows(collection, filter)?.into_iter().next()
        else {
            return Ok(UpdateOutcome::default());
        };

        if !patch.apply(&mut body) {
            return Ok(UpdateOutcome {
                matched: true,
                modified: false,
            });
        }

        let body_text = Value::Object(body).to_string();
        let changed = tx
            .execute(
                "UPDATE documents
                 SET
                    body = ?1,
                    write_count = write_count + 1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?2;",
                params![body_text, id],
            )
            .map_err(|err| update_failed(collection, err))?;
        tx.commit().map_err(|err| update_failed(collection, err))?;

        debug!(
            "event=store_update module=store status=ok collection={} row_id={}",
            collection, id
        );
        Ok(UpdateOutcome {
            matched: true,
            modified: changed == 1,
        })
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        if matches!(filter, Filter::All) {
            let count: i64 = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1;",
                    [collection],
                    |row| row.get(0),
                )
                .map_err(|err| StoreError::classify("count", err))?;
            return Ok(count.max(0) as u64);
        }
        Ok(self.load_rows(collection, filter)?.len() as u64)
    }

    fn insert_one(&self, collection: &str, doc: Document) -> StoreResult<CanonicalId> {
        let key = match doc.get(ID_FIELD) {
            Some(value) => canonicalize(value)?,
            None => {
                return Err(StoreError::InvalidIdentifier(IdentifierError {
                    value: String::new(),
                    reason: "document has no `_id`",
                }))
            }
        };

        let body_text = Value::Object(doc).to_string();
        match self.conn.execute(
            "INSERT INTO documents (collection, doc_key, body) VALUES (?1, ?2, ?3);",
            params![collection, key.as_str(), body_text],
        ) {
            Ok(_) => Ok(key),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key,
                })
            }
            Err(err) => Err(StoreError::classify("insert_one", err)),
        }
    }
}

fn update_failed(collection: &str, err: rusqlite::Error) -> StoreError {
    let err = StoreError::classify("update_one", err);
    warn!(
        "event=store_update module=store status=error collection={} transient={} error={}",
        collection,
        err.is_transient(),
        err
    );
    err
}

fn parse_body(collection: &str, id: i64, body_text: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body_text) {
        Ok(Value::Object(body)) => Ok(body),
        Ok(_) => Err(StoreError::InvalidData(format!(
            "documents.body of row {id} in `{collection}` is not an object"
        ))),
        Err(err) => Err(StoreError::InvalidData(format!(
            "documents.body of row {id} in `{collection}` is not JSON: {err}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDocumentStore;
    use crate::db::open_db_in_memory;
    use crate::model::identifier::CanonicalId;
    use crate::store::{DocumentStore, Filter, Patch, StoreError};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> crate::model::decode::Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn insert_rejects_second_encoding_of_same_id() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        let hex = "66fa1b2c3d4e5f6a7b8c9d0e";

        store.insert_one("batches", doc(json!({ "_id": { "$oid": hex } }))).unwrap();
        let err = store
            .insert_one("batches", doc(json!({ "_id": hex.to_uppercase() })))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        store.insert_one("students", doc(json!({ "_id": hex }))).unwrap();
    }

    #[test]
    fn insert_requires_valid_id() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        assert!(matches!(
            store.insert_one("batches", doc(json!({ "name": "x" }))),
            Err(StoreError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            store.insert_one("batches", doc(json!({ "_id": "" }))),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn noop_update_performs_no_write() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        let key = store
            .insert_one("batches", doc(json!({ "_id": "B1", "member_ids": [] })))
            .unwrap();

        let patch = Patch::new().set("member_ids", json!(["S1"]));
        let first = store.update_one("batches", &Filter::by_id(key.clone()), &patch).unwrap();
        let second = store.update_one("batches", &Filter::by_id(key.clone()), &patch).unwrap();
        assert!(first.matched && first.modified);
        assert!(second.matched && !second.modified);
        assert_eq!(store.write_count("batches", &key).unwrap(), Some(1));
    }

    #[test]
    fn update_without_match_reports_unmatched() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        let outcome = store
            .update_one(
                "batches",
                &Filter::by_id(CanonicalId::parse("missing").unwrap()),
                &Patch::new().set("name", "x"),
            )
            .unwrap();
        assert!(!outcome.matched);
    }

    #[test]
    fn id_patch_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        let err = store
            .update_one("batches", &Filter::All, &Patch::new().set("_id", "B9"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPatch(_)));
    }

    #[test]
    fn find_and_count_preserve_insertion_order() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteDocumentStore::new(&conn);
        for key in ["C", "A", "B"] {
            store
                .insert_one("students", doc(json!({ "_id": key, "role": "student" })))
                .unwrap();
        }
        store
            .insert_one("students", doc(json!({ "_id": "T1", "role": "instructor" })))
            .unwrap();

        let students = store
            .find("students", &Filter::eq("role", "student"))
            .unwrap();
        let keys: Vec<_> = students.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(keys, vec![json!("C"), json!("A"), json!("B")]);
        assert_eq!(store.count("students", &Filter::All).unwrap(), 4);
        assert_eq!(store.count("students", &Filter::eq("role", "instructor")).unwrap(), 1);
        assert!(store.find("unknown", &Filter::All).unwrap().is_empty());
    }
}
