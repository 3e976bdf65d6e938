//! In-memory pipeline executor
//!
//! Interprets the stage vocabulary of [`Stage`] over plain BSON documents
//! held in a `DashMap`, one entry per collection. Used by the test suite and
//! by the CLI in dev mode, where no MongoDB is available.
//!
//! Supported match operators: `$and`, `$or`, `$eq`, `$ne`, `$in`, `$nin`,
//! `$gt`, `$gte`, `$lt`, `$lte`, `$exists`. Updates support `$set`, either as
//! an operator document or as update-pipeline stages whose values may use the
//! `$in` and `$literal` expressions and `"$field"` paths.

use std::cmp::Ordering;

use async_trait::async_trait;
use bson::{Bson, Document};
use dashmap::DashMap;
use mongodb::options::UpdateModifications;
use serde::Serialize;
use tracing::debug;

use crate::db::PipelineExecutor;
use crate::query::{Pipeline, SortDirection, Stage};
use crate::types::{Result, StoreError};

/// Collections of BSON documents kept in process memory
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw document to a collection
    pub fn insert(&self, collection: &str, document: Document) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Serialize and append a typed document
    pub fn insert_typed<T: Serialize>(&self, collection: &str, item: &T) -> Result<()> {
        let document = bson::to_document(item)
            .map_err(|e| StoreError::Decode(format!("Failed to encode document: {}", e)))?;
        self.insert(collection, document);
        Ok(())
    }

    /// Remove every document matching `filter`, returning how many were removed
    pub fn delete_many(&self, collection: &str, filter: &Document) -> Result<usize> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let hits = documents
            .iter()
            .map(|document| matches_filter(document, filter))
            .collect::<Result<Vec<bool>>>()?;
        let removed = hits.iter().filter(|hit| **hit).count();

        let mut hits = hits.into_iter();
        documents.retain(|_| !hits.next().unwrap_or(false));

        Ok(removed)
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn apply_stage(&self, rows: Vec<Document>, stage: &Stage) -> Result<Vec<Document>> {
        match stage {
            Stage::Match(filter) => {
                let mut matched = Vec::with_capacity(rows.len());
                for row in rows {
                    if matches_filter(&row, filter)? {
                        matched.push(row);
                    }
                }
                Ok(matched)
            }
            Stage::Sort { field, direction } => {
                let mut rows = rows;
                // stable, so equal keys keep their incoming order
                rows.sort_by(|a, b| {
                    let ordering = compare_values(resolve(a, field), resolve(b, field));
                    match direction {
                        SortDirection::Ascending => ordering,
                        SortDirection::Descending => ordering.reverse(),
                    }
                });
                Ok(rows)
            }
            Stage::Skip(n) => Ok(rows.into_iter().skip(to_usize(*n)).collect()),
            Stage::Limit(n) => Ok(rows.into_iter().take(to_usize(*n)).collect()),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => {
                let foreign = self.snapshot(from);
                Ok(rows
                    .into_iter()
                    .map(|mut row| {
                        let joined: Vec<Bson> = foreign
                            .iter()
                            .filter(|f| {
                                lookup_matches(
                                    resolve(&row, local_field),
                                    resolve(f, foreign_field),
                                )
                            })
                            .cloned()
                            .map(Bson::Document)
                            .collect();
                        set_path(&mut row, as_field, Bson::Array(joined));
                        row
                    })
                    .collect())
            }
            Stage::Unwind(field) => {
                let mut unwound = Vec::with_capacity(rows.len());
                for row in rows {
                    match resolve(&row, field).cloned() {
                        Some(Bson::Array(items)) => {
                            for item in items {
                                let mut copy = row.clone();
                                set_path(&mut copy, field, item);
                                unwound.push(copy);
                            }
                        }
                        None | Some(Bson::Null) => {}
                        Some(_) => unwound.push(row),
                    }
                }
                Ok(unwound)
            }
            Stage::Count(field) => {
                if rows.is_empty() {
                    return Ok(Vec::new());
                }
                let count = match i32::try_from(rows.len()) {
                    Ok(n) => Bson::Int32(n),
                    Err(_) => Bson::Int64(rows.len() as i64),
                };
                let mut document = Document::new();
                document.insert(field.as_str(), count);
                Ok(vec![document])
            }
        }
    }
}

#[async_trait]
impl PipelineExecutor for MemoryExecutor {
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>> {
        let mut rows = self.snapshot(collection);
        for stage in pipeline.stages() {
            rows = self.apply_stage(rows, stage)?;
        }
        debug!(collection, results = rows.len(), "In-memory aggregation complete");
        Ok(rows)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
    ) -> Result<u64> {
        let (sets, expressions) = match update {
            UpdateModifications::Document(update) => (vec![set_fields(&update)?], false),
            UpdateModifications::Pipeline(stages) => (
                stages.iter().map(set_fields).collect::<Result<Vec<_>>>()?,
                true,
            ),
            _ => {
                return Err(StoreError::InvalidArgument(
                    "unsupported in-memory update form".into(),
                ))
            }
        };

        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        // every change is computed before any is written
        let mut changes = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            if !matches_filter(document, &filter)? {
                continue;
            }
            let mut updated = document.clone();
            for set in &sets {
                for (path, value) in set {
                    let value = if expressions {
                        evaluate(&updated, value)?
                    } else {
                        value.clone()
                    };
                    set_path(&mut updated, path, value);
                }
            }
            if updated != *document {
                changes.push((index, updated));
            }
        }

        let modified = changes.len() as u64;
        for (index, updated) in changes {
            documents[index] = updated;
        }

        Ok(modified)
    }
}

/// Fields of an update that must consist of a single `$set`
fn set_fields(update: &Document) -> Result<Document> {
    match update.get("$set") {
        Some(Bson::Document(set)) if update.len() == 1 => Ok(set.clone()),
        _ => Err(StoreError::InvalidArgument(
            "in-memory updates support a single $set document".into(),
        )),
    }
}

/// Evaluate an aggregation expression against one document
fn evaluate(document: &Document, expression: &Bson) -> Result<Bson> {
    match expression {
        Bson::String(path) if path.starts_with('$') => {
            Ok(resolve(document, &path[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(operator) if operator.keys().next().is_some_and(|k| k.starts_with('$')) => {
            let (name, operand) = match operator.iter().next() {
                Some(entry) if operator.len() == 1 => entry,
                _ => {
                    return Err(StoreError::InvalidArgument(
                        "expression must have exactly one operator".into(),
                    ))
                }
            };
            match name.as_str() {
                "$literal" => Ok(operand.clone()),
                "$in" => {
                    let [needle, haystack] = match operand {
                        Bson::Array(args) if args.len() == 2 => [&args[0], &args[1]],
                        _ => {
                            return Err(StoreError::InvalidArgument(
                                "$in expects [value, array]".into(),
                            ))
                        }
                    };
                    let needle = evaluate(document, needle)?;
                    match evaluate(document, haystack)? {
                        Bson::Array(items) => Ok(Bson::Boolean(
                            items
                                .iter()
                                .any(|item| compare(item, &needle) == Ordering::Equal),
                        )),
                        _ => Err(StoreError::InvalidArgument(
                            "$in requires an array operand".into(),
                        )),
                    }
                }
                other => Err(StoreError::InvalidArgument(format!(
                    "unsupported expression {}",
                    other
                ))),
            }
        }
        Bson::Array(items) => Ok(Bson::Array(
            items
                .iter()
                .map(|item| evaluate(document, item))
                .collect::<Result<Vec<_>>>()?,
        )),
        literal => Ok(literal.clone()),
    }
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Resolve a dotted path through nested documents
fn resolve<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

/// Set a dotted path, creating intermediate documents as needed
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn matches_filter(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches_filter(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches_filter(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidArgument(format!(
                    "unsupported top-level operator {}",
                    op
                )))
            }
            path => matches_condition(resolve(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(StoreError::InvalidArgument(format!("{} expects an array", op)));
    };
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::InvalidArgument(format!("{} expects documents", op)))
        })
        .collect()
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let operators = match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => d,
        literal => return Ok(equals(value, literal)),
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(value, operand, |o| o != Ordering::Less),
            "$lt" => ordered(value, operand, |o| o == Ordering::Less),
            "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            other => {
                return Err(StoreError::InvalidArgument(format!(
                    "unsupported operator {}",
                    other
                )))
            }
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(StoreError::InvalidArgument(format!("{} expects an array", op)));
    };
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        Some(v) if type_rank(v) == type_rank(operand) => accept(compare(v, operand)),
        _ => false,
    }
}

/// Query equality: a missing field equals null, arrays match on any element
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) if !matches!(target, Bson::Array(_)) => {
            items.iter().any(|item| compare(item, target) == Ordering::Equal)
        }
        Some(v) => compare(v, target) == Ordering::Equal,
    }
}

fn lookup_matches(local: Option<&Bson>, foreign: Option<&Bson>) -> bool {
    let local = local.unwrap_or(&Bson::Null);
    match local {
        Bson::Array(items) => items.iter().any(|item| equals(foreign, item)),
        single => equals(foreign, single),
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    compare(a.unwrap_or(&Bson::Null), b.unwrap_or(&Bson::Null))
}

/// Cross-type ordering, following MongoDB's comparison order for BSON types
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

fn compare(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&i64::from(*y)),
        (x, y) if type_rank(x) == 2 => {
            let (x, y) = (as_f64(x), as_f64(y));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Array(x), Bson::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (x, y) if x == y => Ordering::Equal,
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => f64::from(*n),
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 12];
        bytes[11] = n;
        ObjectId::from_bytes(bytes)
    }

    #[test]
    fn test_resolve_and_set_nested_paths() {
        let mut document = doc! { "recipient": { "userId": "U1" } };
        assert_eq!(
            resolve(&document, "recipient.userId"),
            Some(&Bson::String("U1".into()))
        );
        assert_eq!(resolve(&document, "recipient.method"), None);

        set_path(&mut document, "recipient.method", Bson::String("EMAIL".into()));
        assert_eq!(
            document.get_document("recipient").unwrap().get_str("method").unwrap(),
            "EMAIL"
        );
    }

    #[test]
    fn test_match_operators() {
        let document = doc! { "a": 5, "b": "x", "tags": ["p", "q"] };

        assert!(matches_filter(&document, &doc! { "a": 5_i64 }).unwrap());
        assert!(matches_filter(&document, &doc! { "a": { "$gte": 5, "$lt": 6 } }).unwrap());
        assert!(matches_filter(&document, &doc! { "b": { "$in": ["y", "x"] } }).unwrap());
        assert!(!matches_filter(&document, &doc! { "b": { "$nin": ["x"] } }).unwrap());
        assert!(matches_filter(&document, &doc! { "tags": "q" }).unwrap());
        assert!(matches_filter(&document, &doc! { "missing": Bson::Null }).unwrap());
        assert!(matches_filter(&document, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches_filter(
            &document,
            &doc! { "$or": [ { "a": 1 }, { "b": "x" } ] }
        )
        .unwrap());
        assert!(!matches_filter(
            &document,
            &doc! { "$and": [ { "a": 5 }, { "b": "z" } ] }
        )
        .unwrap());
    }

    #[test]
    fn test_unsupported_operator_is_rejected() {
        let document = doc! { "a": 1 };
        assert!(matches_filter(&document, &doc! { "a": { "$regex": "x" } }).is_err());
        assert!(matches_filter(&document, &doc! { "$where": "true" }).is_err());
    }

    #[test]
    fn test_object_id_ordering() {
        assert_eq!(
            compare(&Bson::ObjectId(oid(3)), &Bson::ObjectId(oid(1))),
            Ordering::Greater
        );
    }

    #[tokio::test]
    async fn test_lookup_and_unwind_drop_unmatched() {
        let executor = MemoryExecutor::new();
        executor.insert("publishes", doc! { "_id": oid(10), "data": "hello" });
        executor.insert("notes", doc! { "_id": oid(1), "publishId": oid(10) });
        executor.insert("notes", doc! { "_id": oid(2), "publishId": oid(99) });

        let pipeline = Pipeline::new(vec![
            Stage::Lookup {
                from: "publishes".into(),
                local_field: "publishId".into(),
                foreign_field: "_id".into(),
                as_field: "publish".into(),
            },
            Stage::Unwind("publish".into()),
        ]);

        let rows = executor.aggregate("notes", &pipeline).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get_document("publish").unwrap().get_str("data").unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_count_of_empty_set_yields_no_document() {
        let executor = MemoryExecutor::new();
        let pipeline = Pipeline::new(vec![Stage::Count("count".into())]);
        assert!(executor.aggregate("nothing", &pipeline).await.unwrap().is_empty());

        executor.insert("things", doc! { "_id": oid(1) });
        let rows = executor.aggregate("things", &pipeline).await.unwrap();
        assert_eq!(rows[0].get_i32("count").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sort_skip_limit() {
        let executor = MemoryExecutor::new();
        for n in [2u8, 5, 1, 4, 3] {
            executor.insert("things", doc! { "_id": oid(n) });
        }

        let pipeline = Pipeline::new(vec![
            Stage::Sort {
                field: "_id".into(),
                direction: SortDirection::Descending,
            },
            Stage::Skip(1),
            Stage::Limit(2),
        ]);

        let rows = executor.aggregate("things", &pipeline).await.unwrap();
        let ids: Vec<ObjectId> = rows.iter().map(|r| r.get_object_id("_id").unwrap()).collect();
        assert_eq!(ids, vec![oid(4), oid(3)]);
    }

    #[tokio::test]
    async fn test_update_many_counts_only_changes() {
        let executor = MemoryExecutor::new();
        executor.insert("things", doc! { "_id": oid(1), "flag": false });
        executor.insert("things", doc! { "_id": oid(2), "flag": true });

        let modified = executor
            .update_many(
                "things",
                doc! { "_id": { "$in": [oid(1), oid(2)] } },
                doc! { "$set": { "flag": true } }.into(),
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        assert!(executor
            .update_many("things", doc! {}, doc! { "$inc": { "n": 1 } }.into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_pipeline_update_evaluates_in_expression() {
        let executor = MemoryExecutor::new();
        for n in 1..=3 {
            executor.insert("things", doc! { "_id": oid(n), "flag": n == 2 });
        }

        let modified = executor
            .update_many(
                "things",
                doc! { "_id": { "$in": [oid(1), oid(2)] } },
                vec![doc! { "$set": { "flag": { "$in": ["$_id", [oid(1)]] } } }].into(),
            )
            .await
            .unwrap();
        assert_eq!(modified, 2);

        let flags: Vec<bool> = executor
            .snapshot("things")
            .iter()
            .map(|d| d.get_bool("flag").unwrap())
            .collect();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let executor = MemoryExecutor::new();
        executor.insert("things", doc! { "_id": oid(1), "flag": false, "list": [oid(1)] });
        executor.insert("things", doc! { "_id": oid(2), "flag": false, "list": 5 });

        // the first document evaluates, the second does not
        let result = executor
            .update_many(
                "things",
                doc! {},
                vec![doc! { "$set": { "flag": { "$in": ["$_id", "$list"] } } }].into(),
            )
            .await;
        assert!(result.is_err());
        assert!(executor
            .snapshot("things")
            .iter()
            .all(|d| !d.get_bool("flag").unwrap()));
    }

    #[test]
    fn test_delete_many() {
        let executor = MemoryExecutor::new();
        executor.insert("things", doc! { "_id": oid(1) });
        executor.insert("things", doc! { "_id": oid(2) });

        assert_eq!(executor.delete_many("things", &doc! { "_id": oid(1) }).unwrap(), 1);
        assert_eq!(executor.len("things"), 1);
        assert_eq!(executor.delete_many("absent", &doc! {}).unwrap(), 0);
    }
}
