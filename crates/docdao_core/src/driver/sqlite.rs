//! SQLite-backed JSON document store.
//!
//! # Responsibility
//! - Persist documents as JSON text in the `documents` table.
//! - Own the connection lifecycle (open, adopt, close).
//!
//! # Invariants
//! - `body[key_field] == doc_key` for every row written by this store, and
//!   `(collection, key_field, doc_key)` is unique.
//! - Key lookups through another field decode the body, so any string field
//!   can address a collection.
//! - Natural order is `seq` (insertion order).
//! - Writes that resolve a key run inside one immediate transaction.

use crate::config::StoreConfig;
use crate::db::migrations::{current_version, latest_version};
use crate::db::{open_db_in_memory, open_with_config, DbError};
use crate::driver::eval::evaluate;
use crate::driver::{
    has_key, insert_key, CollectionRef, DriverError, DriverResult, StorageDriver,
};
use crate::model::document::{Document, DocumentId};
use crate::model::filter::Filter;
use log::info;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use serde_json::Value;

/// Candidate rows for a key lookup: the indexed row keyed by the same field,
/// plus every row keyed by another field.
const SELECT_KEY_CANDIDATES: &str = "SELECT seq, key_field, body
     FROM documents
     WHERE collection = ?1
       AND ((key_field = ?2 AND doc_key = ?3) OR key_field <> ?2)
     ORDER BY seq ASC;";

/// Row resolved by `locate`.
struct KeyedRow {
    seq: i64,
    key_field: String,
    document: Document,
}

pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(config: &StoreConfig) -> DriverResult<Self> {
        Ok(Self {
            conn: open_with_config(config)?,
        })
    }

    pub fn open_in_memory() -> DriverResult<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
        })
    }

    /// Adopts a connection that was opened through `db::open_*`.
    ///
    /// # Errors
    /// - `DbError::UninitializedConnection` when the schema version is not
    ///   the latest one.
    pub fn from_connection(conn: Connection) -> DriverResult<Self> {
        let actual_version = current_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(DbError::UninitializedConnection {
                expected_version,
                actual_version,
            }
            .into());
        }
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Closes the underlying connection, reporting any close failure.
    pub fn close(self) -> DriverResult<()> {
        self.conn.close().map_err(|(_, err)| DriverError::from(err))?;
        info!("event=db_close module=driver status=ok");
        Ok(())
    }
}

impl StorageDriver for SqliteDocumentStore {
    fn find_by_key(
        &self,
        target: CollectionRef<'_>,
        id: &DocumentId,
    ) -> DriverResult<Option<Document>> {
        Ok(locate(&self.conn, target, id)?.map(|row| row.document))
    }

    fn find(&self, target: CollectionRef<'_>, filter: &Filter) -> DriverResult<Vec<Document>> {
        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?");
        let mut bind_values = vec![SqlValue::Text(target.name.to_string())];

        if let Some(Value::String(key)) = filter.conditions.get(target.primary_key) {
            sql.push_str(" AND ((key_field = ? AND doc_key = ?) OR key_field <> ?)");
            bind_values.push(SqlValue::Text(target.primary_key.to_string()));
            bind_values.push(SqlValue::Text(key.clone()));
            bind_values.push(SqlValue::Text(target.primary_key.to_string()));
        }
        sql.push_str(" ORDER BY seq ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            documents.push(decode_body(&body)?);
        }

        evaluate(target, documents, filter)
    }

    fn insert_one(&self, target: CollectionRef<'_>, document: &Document) -> DriverResult<()> {
        let id = insert_key(target, document)?;
        let body = serde_json::to_string(document)?;
        let duplicate = || DriverError::DuplicateKey {
            collection: target.name.to_string(),
            id: id.clone(),
        };

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        if locate(&tx, target, &id)?.is_some() {
            return Err(duplicate());
        }
        match tx.execute(
            "INSERT INTO documents (collection, key_field, doc_key, body) VALUES (?1, ?2, ?3, ?4);",
            params![target.name, target.primary_key, id.as_str(), body],
        ) {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(duplicate()),
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(())
    }

    fn update_by_key(
        &self,
        target: CollectionRef<'_>,
        id: &DocumentId,
        patch: &Document,
    ) -> DriverResult<bool> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let Some(KeyedRow {
            seq,
            key_field,
            mut document,
        }) = locate(&tx, target, id)?
        else {
            return Ok(false);
        };

        for (field, value) in patch {
            if field != target.primary_key {
                document.insert(field.clone(), value.clone());
            }
        }

        // The patch may rewrite the row's own key field; rekey it by the
        // lookup field, whose value the patch never touches.
        let (key_field, doc_key) = match DocumentId::from_document(&document, &key_field) {
            Some(current) => (key_field, current),
            None => (target.primary_key.to_string(), id.clone()),
        };

        let updated = tx.execute(
            "UPDATE documents
             SET
                key_field = ?1,
                doc_key = ?2,
                body = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE seq = ?4;",
            params![key_field, doc_key.as_str(), serde_json::to_string(&document)?, seq],
        );
        match updated {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(DriverError::DuplicateKey {
                    collection: target.name.to_string(),
                    id: doc_key,
                });
            }
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(true)
    }

    fn delete_by_key(&self, target: CollectionRef<'_>, id: &DocumentId) -> DriverResult<bool> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let Some(row) = locate(&tx, target, id)? else {
            return Ok(false);
        };
        let changed = tx.execute("DELETE FROM documents WHERE seq = ?1;", [row.seq])?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn list_collections(&self) -> DriverResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT collection FROM documents ORDER BY collection ASC;")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn drop_collection(&self, collection: &str) -> DriverResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM documents WHERE collection = ?1;", [collection])?)
    }
}

/// First row, in natural order, whose body holds `id` under
/// `target.primary_key`.
fn locate(
    conn: &Connection,
    target: CollectionRef<'_>,
    id: &DocumentId,
) -> DriverResult<Option<KeyedRow>> {
    let mut stmt = conn.prepare_cached(SELECT_KEY_CANDIDATES)?;
    let mut rows = stmt.query(params![target.name, target.primary_key, id.as_str()])?;
    while let Some(row) = rows.next()? {
        let body: String = row.get(2)?;
        let document = decode_body(&body)?;
        if has_key(target, &document, id) {
            return Ok(Some(KeyedRow {
                seq: row.get(0)?,
                key_field: row.get(1)?,
                document,
            }));
        }
    }
    Ok(None)
}

fn decode_body(body: &str) -> DriverResult<Document> {
    serde_json::from_str::<Document>(body).map_err(|err| {
        DriverError::InvalidData(format!("documents.body is not a JSON object: {err}"))
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
