//! Filter grammar to BSON translation and BSON to record decoding

use crate::domain::{Clause, Comparison, Filter, Record, Result, Sort, SortOrder, StorageError};
use bson::{Bson, Document};
use serde_json::{Number, Value};
use std::collections::HashSet;

/// Translates a filter into a native query document
///
/// Operators map 1:1 onto `$gt`, `$gte`, `$lt`, `$lte`, `$ne`, `$in`, `$nin`, `$or`
/// and `$and`; equality is written as a plain `field: value` pair. When two clauses
/// share a key the clauses are combined under `$and`.
pub fn filter_to_document(filter: &Filter) -> Result<Document> {
    filter.validate()?;

    let mut parts = Vec::with_capacity(filter.clauses().len());
    for clause in filter.clauses() {
        parts.push(clause_to_document(clause)?);
    }
    Ok(combine(parts))
}

fn combine(parts: Vec<Document>) -> Document {
    let mut seen = HashSet::new();
    let collision = parts
        .iter()
        .flat_map(|part| part.keys())
        .any(|key| !seen.insert(key.as_str()));

    if collision {
        let all: Vec<Bson> = parts.into_iter().map(Bson::Document).collect();
        let mut doc = Document::new();
        doc.insert("$and", all);
        return doc;
    }

    parts.into_iter().flatten().collect()
}

fn clause_to_document(clause: &Clause) -> Result<Document> {
    let mut doc = Document::new();
    match clause {
        Clause::Field { field, comparison } => {
            let condition = match comparison {
                Comparison::Eq(value) => json_to_bson(value)?,
                Comparison::Ne(value) => operator("$ne", json_to_bson(value)?),
                Comparison::Gt(value) => operator("$gt", json_to_bson(value)?),
                Comparison::Gte(value) => operator("$gte", json_to_bson(value)?),
                Comparison::Lt(value) => operator("$lt", json_to_bson(value)?),
                Comparison::Lte(value) => operator("$lte", json_to_bson(value)?),
                Comparison::In(values) => operator("$in", list_to_bson(values)?),
                Comparison::Nin(values) => operator("$nin", list_to_bson(values)?),
            };
            doc.insert(field.clone(), condition);
        }
        Clause::Or(filters) => {
            doc.insert("$or", sub_filters(filters)?);
        }
        Clause::And(filters) => {
            doc.insert("$and", sub_filters(filters)?);
        }
    }
    Ok(doc)
}

fn sub_filters(filters: &[Filter]) -> Result<Vec<Bson>> {
    filters
        .iter()
        .map(|f| filter_to_document(f).map(Bson::Document))
        .collect()
}

fn operator(name: &str, value: Bson) -> Bson {
    let mut doc = Document::new();
    doc.insert(name, value);
    Bson::Document(doc)
}

fn list_to_bson(values: &[Value]) -> Result<Bson> {
    Ok(Bson::Array(
        values.iter().map(json_to_bson).collect::<Result<Vec<_>>>()?,
    ))
}

/// Converts a JSON value into BSON, integers staying integral
pub fn json_to_bson(value: &Value) -> Result<Bson> {
    bson::to_bson(value)
        .map_err(|e| StorageError::InvalidFilter(format!("value not representable: {e}")).into())
}

/// Converts a record into a document for insert or `$set`
pub fn record_to_document(record: &Record) -> Result<Document> {
    bson::to_document(record).map_err(|e| {
        StorageError::InvalidFilter(format!("record not representable: {e}")).into()
    })
}

pub fn sort_to_document(sort: &Sort) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }
    let doc = sort
        .keys()
        .iter()
        .map(|(field, order)| {
            let direction = match order {
                SortOrder::Ascending => 1,
                SortOrder::Descending => -1,
            };
            (field.clone(), Bson::Int32(direction))
        })
        .collect();
    Some(doc)
}

pub fn projection(columns: &[String]) -> Option<Document> {
    if columns.is_empty() {
        return None;
    }
    Some(
        columns
            .iter()
            .map(|column| (column.clone(), Bson::Int32(1)))
            .collect(),
    )
}

/// Decodes a document into a record
///
/// Object ids become hex strings, dates become RFC3339 strings and binary data is
/// read as UTF-8 text.
pub fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::Number(n.into()),
        Bson::Int64(n) => Value::Number(n.into()),
        Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::Number(dt.timestamp_millis().into()),
        },
        Bson::Binary(bin) => Value::String(String::from_utf8_lossy(&bin.bytes).into_owned()),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_record(doc)),
        other => other.into_relaxed_extjson(),
    }
}

/// Renders an inserted id as a string
pub fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => match bson_to_json(other) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}
