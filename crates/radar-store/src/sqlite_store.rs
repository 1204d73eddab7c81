use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use uuid::Uuid;

use crate::document::{document_id, Document, Filter, Update, ID_FIELD};
use crate::store::{Collection, DocumentStore, StoreError};

/// SQLite-backed implementation of the DocumentStore trait.
///
/// Each collection is a table of JSON bodies; `seq` preserves insertion order.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Unavailable(format!("open: {}", e)))?;
        tracing::info!("Opened radar database at {:?}", path);
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        for collection in Collection::ALL {
            conn.execute_batch(&format!(
                "
                CREATE TABLE IF NOT EXISTS {table} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    body TEXT NOT NULL
                );
                ",
                table = collection.name()
            ))
            .map_err(|e| StoreError::Unavailable(format!("init_schema: {}", e)))?;
        }
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_items_scene ON items(json_extract(body, '$.scene_id'));",
        )
        .map_err(|e| StoreError::Unavailable(format!("init_index: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn select(
        conn: &Connection,
        collection: Collection,
        filter: &Filter,
        limit_one: bool,
    ) -> Result<Vec<(i64, Document)>, StoreError> {
        let compiled = compile_filter(filter);
        let sql = format!(
            "SELECT seq, body FROM {} {} ORDER BY seq{}",
            collection.name(),
            compiled.where_clause,
            if limit_one { " LIMIT 1" } else { "" }
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Unavailable(format!("prepare find: {} (sql: {})", e, sql)))?;
        let rows = stmt
            .query_map(params_from_iter(compiled.params.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::Unavailable(format!("find: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Unavailable(format!("collect find: {}", e)))?;

        rows.into_iter()
            .map(|(seq, body)| Ok((seq, parse_body(&body)?)))
            .collect()
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let conn = self.lock()?;
        Ok(Self::select(&conn, collection, filter, true)?
            .into_iter()
            .next()
            .map(|(_, doc)| doc))
    }

    fn find(&self, collection: Collection, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let conn = self.lock()?;
        Ok(Self::select(&conn, collection, filter, false)?
            .into_iter()
            .map(|(_, doc)| doc)
            .collect())
    }

    fn insert_one(&self, collection: Collection, mut doc: Document) -> Result<String, StoreError> {
        let id = match document_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO {} (id, body) VALUES (?1, ?2)", collection.name()),
            params![id, body],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.code == rusqlite::ErrorCode::ConstraintViolation {
                    return StoreError::DuplicateId {
                        collection,
                        id: id.clone(),
                    };
                }
            }
            StoreError::Unavailable(format!("insert: {}", e))
        })?;
        Ok(id)
    }

    fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        update: &Update,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Unavailable(format!("begin tx: {}", e)))?;

        let Some((seq, mut doc)) = Self::select(&tx, collection, filter, true)?.into_iter().next()
        else {
            return Ok(false);
        };
        update.apply(&mut doc)?;
        let body = serde_json::to_string(&doc).map_err(|e| StoreError::Malformed(e.to_string()))?;
        tx.execute(
            &format!("UPDATE {} SET body = ?1 WHERE seq = ?2", collection.name()),
            params![body, seq],
        )
        .map_err(|e| StoreError::Unavailable(format!("update: {}", e)))?;

        tx.commit()
            .map_err(|e| StoreError::Unavailable(format!("commit: {}", e)))?;
        Ok(true)
    }

    fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let compiled = compile_filter(filter);
        let sql = format!("DELETE FROM {} {}", collection.name(), compiled.where_clause);
        conn.execute(&sql, params_from_iter(compiled.params.iter()))
            .map_err(|e| StoreError::Unavailable(format!("delete: {}", e)))
    }

    fn count(&self, collection: Collection, filter: &Filter) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let compiled = compile_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM {} {}", collection.name(), compiled.where_clause);
        let count: i64 = conn
            .query_row(&sql, params_from_iter(compiled.params.iter()), |row| row.get(0))
            .map_err(|e| StoreError::Unavailable(format!("count: {}", e)))?;
        Ok(count as usize)
    }
}

struct CompiledFilter {
    where_clause: String,
    params: Vec<SqlValue>,
}

/// Compile equality clauses into a parameterized WHERE clause.
///
/// `_id` maps to the indexed `id` column; other fields go through
/// `json_extract`. Plain identifier paths are written into the SQL so the
/// planner can match expression indexes such as `idx_items_scene`; any other
/// field name is bound as a quoted path parameter.
fn compile_filter(filter: &Filter) -> CompiledFilter {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for (field, value) in &filter.clauses {
        let column = if field == ID_FIELD {
            "id".to_string()
        } else if is_plain_field(field) {
            format!("json_extract(body, '$.{}')", field)
        } else {
            params.push(SqlValue::Text(format!("$.\"{}\"", field)));
            format!("json_extract(body, ?{})", params.len())
        };
        match to_sql_value(value) {
            SqlValue::Null => conditions.push(format!("{} IS NULL", column)),
            sql_value => {
                params.push(sql_value);
                conditions.push(format!("{} = ?{}", column, params.len()));
            }
        }
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    CompiledFilter {
        where_clause,
        params,
    }
}

/// ASCII identifier, safe to splice into a JSON path literal.
fn is_plain_field(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Map a JSON value to what `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn parse_body(body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(StoreError::Malformed(format!("body is not an object: {}", other))),
        Err(e) => Err(StoreError::Malformed(format!("parse body: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn insert_and_find_round_trip() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let id = store
            .insert_one(
                Collection::Items,
                doc(json!({"scene_id": "s", "name": "New", "pos": [1.5, -2.0]})),
            )
            .unwrap();
        let got = store
            .find_one(Collection::Items, &Filter::by_id(&id))
            .unwrap()
            .unwrap();
        assert_eq!(got["pos"], json!([1.5, -2.0]));
        assert_eq!(got["scene_id"], json!("s"));
    }

    #[test]
    fn insert_duplicate_fails() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_one(Collection::Scenes, doc(json!({"_id": "x"})))
            .unwrap();
        let err = store
            .insert_one(Collection::Scenes, doc(json!({"_id": "x"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn filter_on_json_fields() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_one(Collection::Items, doc(json!({"scene_id": "a", "locked": true})))
            .unwrap();
        store
            .insert_one(Collection::Items, doc(json!({"scene_id": "a", "locked": false})))
            .unwrap();
        store
            .insert_one(Collection::Items, doc(json!({"scene_id": "b"})))
            .unwrap();

        let in_a = Filter::new().eq("scene_id", "a");
        assert_eq!(store.count(Collection::Items, &in_a).unwrap(), 2);
        let locked = Filter::new().eq("scene_id", "a").eq("locked", true);
        assert_eq!(store.find(Collection::Items, &locked).unwrap().len(), 1);
        let no_lock = Filter::new().eq("locked", Value::Null);
        assert_eq!(store.find(Collection::Items, &no_lock).unwrap().len(), 1);
    }

    #[test]
    fn update_applies_operators() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let id = store
            .insert_one(Collection::Items, doc(json!({"tags": ["a"], "comments": []})))
            .unwrap();
        let update = Update::new()
            .add_to_set("tags", "b")
            .push("comments", json!({"text": "first"}));
        assert!(store
            .update_one(Collection::Items, &Filter::by_id(&id), &update)
            .unwrap());
        let got = store
            .find_one(Collection::Items, &Filter::by_id(&id))
            .unwrap()
            .unwrap();
        assert_eq!(got["tags"], json!(["a", "b"]));
        assert_eq!(got["comments"], json!([{"text": "first"}]));
    }

    #[test]
    fn update_missing_document_is_not_an_error() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let matched = store
            .update_one(
                Collection::Items,
                &Filter::by_id("nope"),
                &Update::new().set("name", "x"),
            )
            .unwrap();
        assert!(!matched);
    }

    #[test]
    fn delete_many_and_order() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for name in ["z", "y", "x"] {
            store
                .insert_one(Collection::Items, doc(json!({"scene_id": "s", "name": name})))
                .unwrap();
        }
        let names: Vec<_> = store
            .find(Collection::Items, &Filter::new().eq("scene_id", "s"))
            .unwrap()
            .into_iter()
            .map(|d| d["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("z"), json!("y"), json!("x")]);

        let removed = store
            .delete_many(Collection::Items, &Filter::new().eq("scene_id", "s"))
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.count(Collection::Items, &Filter::new()).unwrap(), 0);
    }

    #[test]
    fn scene_filter_uses_expression_index() {
        let compiled = compile_filter(&Filter::new().eq("scene_id", "s"));
        assert_eq!(
            compiled.where_clause,
            "WHERE json_extract(body, '$.scene_id') = ?1"
        );
        assert_eq!(compiled.params.len(), 1);

        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let conn = store.lock().unwrap();
        let sql = format!("EXPLAIN QUERY PLAN SELECT body FROM items {}", compiled.where_clause);
        let mut stmt = conn.prepare(&sql).unwrap();
        let plan: Vec<String> = stmt
            .query_map(params_from_iter(compiled.params.iter()), |row| row.get(3))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(
            plan.iter().any(|step| step.contains("idx_items_scene")),
            "plan did not use the index: {:?}",
            plan
        );
    }

    #[test]
    fn odd_field_names_stay_bound() {
        assert!(is_plain_field("locked_by"));
        assert!(!is_plain_field("it's"));
        assert!(!is_plain_field("a.b"));
        assert!(!is_plain_field(""));

        let compiled = compile_filter(&Filter::new().eq("it's", 1));
        assert_eq!(compiled.where_clause, "WHERE json_extract(body, ?1) = ?2");

        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_one(Collection::Items, doc(json!({"it's": 1})))
            .unwrap();
        let count = store
            .count(Collection::Items, &Filter::new().eq("it's", 1))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radar.db");
        let id = {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store
                .insert_one(Collection::Scenes, doc(json!({"name": "Demo Scene 01"})))
                .unwrap()
        };
        let store = SqliteDocumentStore::open(&path).unwrap();
        let got = store
            .find_one(Collection::Scenes, &Filter::by_id(&id))
            .unwrap()
            .unwrap();
        assert_eq!(got["name"], json!("Demo Scene 01"));
    }
}
