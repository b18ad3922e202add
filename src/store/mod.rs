//! Document store abstraction.
//!
//! Documents are JSON objects addressed by slash-separated paths made of
//! alternating collection and document ids (`schools/SCH2026-12345`,
//! `schools/SCH2026-12345/students/_placeholder`). A collection only lists its
//! direct children. Multi-document writes go through [`WriteBatch`] and are
//! applied atomically by [`DocumentStore::commit`].

pub mod memory;
pub mod postgres;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Invalid field path '{field}' on {path}")]
    InvalidField { path: String, field: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A document as returned by queries.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub path: String,
    pub data: Value,
}

impl DocumentSnapshot {
    /// Last path segment.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Emitted once per committed batch, listing every collection it touched.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChangeEvent {
    pub collections: Vec<String>,
}

impl ChangeEvent {
    pub fn touches(&self, collection: &str) -> bool {
        self.collections.iter().any(|c| c == collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// In-process evaluation shared by backends that cannot push the query down.
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| field_at(data, field) == Some(expected))
    }

    pub fn sort(&self, docs: &mut [DocumentSnapshot]) {
        if let Some((field, direction)) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(field_at(&a.data, field), field_at(&b.data, field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
    }
}

#[derive(Debug, Clone)]
pub enum WriteOp {
    Set { path: String, data: Value },
    Create { path: String, data: Value },
    Update { path: String, fields: Vec<(String, Value)> },
    Delete { path: String },
    DeleteTree { path: String },
}

impl WriteOp {
    pub fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Create { path, .. }
            | WriteOp::Update { path, .. }
            | WriteOp::Delete { path }
            | WriteOp::DeleteTree { path } => path,
        }
    }
}

/// Ordered list of writes committed all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set { path: path.into(), data });
        self
    }

    /// Like `set`, but the whole batch fails if the document already exists.
    pub fn create(&mut self, path: impl Into<String>, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Create { path: path.into(), data });
        self
    }

    pub fn update(&mut self, path: impl Into<String>, fields: Vec<(String, Value)>) -> &mut Self {
        self.ops.push(WriteOp::Update { path: path.into(), fields });
        self
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { path: path.into() });
        self
    }

    /// Deletes the document and every document nested below it.
    pub fn delete_tree(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::DeleteTree { path: path.into() });
        self
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Validates every path and returns the distinct collections touched,
    /// in first-seen order.
    pub fn touched_collections(&self) -> StoreResult<Vec<String>> {
        let mut collections: Vec<String> = Vec::new();
        for op in &self.ops {
            let collection = collection_of(op.path())?.to_string();
            if !collections.contains(&collection) {
                collections.push(collection);
            }
        }
        Ok(collections)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>>;

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Subscribes to committed changes. Dropping the receiver unsubscribes.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn ping(&self) -> StoreResult<()>;

    async fn set(&self, path: &str, data: Value) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.set(path, data);
        self.commit(batch).await
    }

    async fn update(&self, path: &str, fields: Vec<(String, Value)>) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.update(path, fields);
        self.commit(batch).await
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(path);
        self.commit(batch).await
    }
}

/// Returns the collection part of a document path.
pub fn collection_of(path: &str) -> StoreResult<&str> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 || segments.iter().any(|s| s.trim().is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let (collection, _) = path
        .rsplit_once('/')
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    Ok(collection)
}

/// True when `path` lies strictly below `root` in the tree.
pub fn is_descendant(path: &str, root: &str) -> bool {
    path.len() > root.len() + 1 && path.starts_with(root) && path.as_bytes()[root.len()] == b'/'
}

/// Reads a dotted field path (`plan.limits.students`).
pub fn field_at<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(data, |current, key| current.as_object()?.get(key))
}

/// Writes a dotted field path, creating intermediate objects as needed.
/// Fails when an intermediate value exists but is not an object.
pub fn set_field(data: &mut Value, field: &str, value: Value) -> Result<(), String> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(field.to_string());
    }
    let mut current = data;
    let mut keys = field.split('.').peekable();
    while let Some(key) = keys.next() {
        let map = current.as_object_mut().ok_or_else(|| field.to_string())?;
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

/// Applies dotted-path field updates to a document in place.
pub(crate) fn apply_fields(
    path: &str,
    data: &mut Value,
    fields: &[(String, Value)],
) -> StoreResult<()> {
    for (field, value) in fields {
        set_field(data, field, value.clone()).map_err(|field| StoreError::InvalidField {
            path: path.to_string(),
            field,
        })?;
    }
    Ok(())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_of_nested_paths() {
        assert_eq!(collection_of("schools/SCH2026-10000").unwrap(), "schools");
        assert_eq!(
            collection_of("schools/SCH2026-10000/students/_placeholder").unwrap(),
            "schools/SCH2026-10000/students"
        );
        assert!(collection_of("schools").is_err());
        assert!(collection_of("schools//x/y").is_err());
        assert!(collection_of("").is_err());
    }

    #[test]
    fn descendant_check_respects_segment_boundary() {
        assert!(is_descendant("schools/A/students/_placeholder", "schools/A"));
        assert!(!is_descendant("schools/AB/students/x", "schools/A"));
        assert!(!is_descendant("schools/A", "schools/A"));
    }

    #[test]
    fn set_field_creates_nested_objects() {
        let mut doc = json!({ "Pro": { "name": "Pro" } });
        set_field(&mut doc, "Pro.limits.students", json!(200)).unwrap();
        set_field(&mut doc, "Pro.allowedFeatures", json!(["exams"])).unwrap();
        assert_eq!(field_at(&doc, "Pro.limits.students"), Some(&json!(200)));
        assert_eq!(field_at(&doc, "Pro.name"), Some(&json!("Pro")));
        assert_eq!(field_at(&doc, "Pro.allowedFeatures.0"), None);
    }

    #[test]
    fn set_field_rejects_scalar_intermediate() {
        let mut doc = json!({ "plan": "Pro" });
        assert!(set_field(&mut doc, "plan.name", json!("x")).is_err());
        assert!(set_field(&mut doc, "a..b", json!(1)).is_err());
    }

    #[test]
    fn query_filters_and_sorts() {
        let query = Query::collection("schools")
            .where_eq("plan.name", "Pro")
            .order_by("createdAt", Direction::Descending);
        let mut docs = vec![
            DocumentSnapshot {
                path: "schools/a".into(),
                data: json!({ "plan": { "name": "Pro" }, "createdAt": "2026-01-01T00:00:00.000000Z" }),
            },
            DocumentSnapshot {
                path: "schools/b".into(),
                data: json!({ "plan": { "name": "Pro" }, "createdAt": "2026-03-01T00:00:00.000000Z" }),
            },
        ];
        assert!(docs.iter().all(|d| query.matches(&d.data)));
        assert!(!query.matches(&json!({ "plan": { "name": "Normal" } })));
        query.sort(&mut docs);
        assert_eq!(docs[0].id(), "b");
    }

    #[test]
    fn batch_reports_distinct_collections() {
        let mut batch = WriteBatch::new();
        batch
            .create("schools/A", json!({}))
            .set("schools/A/students/_placeholder", json!({}))
            .update("schools/B", vec![]);
        assert_eq!(
            batch.touched_collections().unwrap(),
            vec!["schools".to_string(), "schools/A/students".to_string()]
        );
    }
}
