//! Backend-neutral filter grammar
//!
//! A [`Filter`] is an implicit conjunction of clauses. Each clause either
//! constrains one field with exactly one comparison, or groups sub-filters under
//! a logical `or` / `and`. The operator set is closed; both storage variants
//! translate the same tree into their native query form.
//!
//! ```
//! use ckg_bridge::domain::filter::Filter;
//!
//! let filter = Filter::new()
//!     .gte("updated_at", "2025-01-01T00:00:00Z")
//!     .lt("updated_at", "2025-01-02T00:00:00Z")
//!     .or(vec![
//!         Filter::new().eq("terduga_id", "T-1"),
//!         Filter::new().eq("pasien_nik", "3201"),
//!     ]);
//! assert!(filter.validate().is_ok());
//! ```

use crate::domain::record::{compare_values, values_equal, Record};
use crate::domain::{BridgeError, Result, StorageError};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Operators of the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Or,
    And,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Or => "or",
            Operator::And => "and",
        };
        write!(f, "{name}")
    }
}

/// A single comparison against one field
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Comparison {
    pub fn operator(&self) -> Operator {
        match self {
            Comparison::Eq(_) => Operator::Eq,
            Comparison::Ne(_) => Operator::Ne,
            Comparison::Gt(_) => Operator::Gt,
            Comparison::Gte(_) => Operator::Gte,
            Comparison::Lt(_) => Operator::Lt,
            Comparison::Lte(_) => Operator::Lte,
            Comparison::In(_) => Operator::In,
            Comparison::Nin(_) => Operator::Nin,
        }
    }

    /// Evaluates the comparison against a field value (`None` when absent)
    fn accepts(&self, actual: Option<&Value>) -> bool {
        let present = actual.filter(|v| !v.is_null());
        match self {
            Comparison::Eq(Value::Null) => present.is_none(),
            Comparison::Eq(expected) => present.is_some_and(|v| values_equal(v, expected)),
            Comparison::Ne(Value::Null) => present.is_some(),
            Comparison::Ne(expected) => !present.is_some_and(|v| values_equal(v, expected)),
            Comparison::Gt(bound) => ordered(present, bound, |o| o == Ordering::Greater),
            Comparison::Gte(bound) => ordered(present, bound, |o| o != Ordering::Less),
            Comparison::Lt(bound) => ordered(present, bound, |o| o == Ordering::Less),
            Comparison::Lte(bound) => ordered(present, bound, |o| o != Ordering::Greater),
            Comparison::In(set) => {
                present.is_some_and(|v| set.iter().any(|candidate| values_equal(v, candidate)))
            }
            Comparison::Nin(set) => match present {
                None => true,
                Some(v) => !set.iter().any(|candidate| values_equal(v, candidate)),
            },
        }
    }
}

fn ordered(actual: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    actual
        .and_then(|v| compare_values(v, bound))
        .is_some_and(accept)
}

/// One conjunct of a [`Filter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Field {
        field: String,
        comparison: Comparison,
    },
    Or(Vec<Filter>),
    And(Vec<Filter>),
}

/// Backend-neutral "find records matching X"
///
/// An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Creates an empty (match-all) filter
    pub fn new() -> Self {
        Self::default()
    }

    fn field(mut self, field: impl Into<String>, comparison: Comparison) -> Self {
        self.clauses.push(Clause::Field {
            field: field.into(),
            comparison,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Eq(value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Ne(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Gt(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Gte(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Lt(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(field, Comparison::Lte(value.into()))
    }

    pub fn is_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let set = values.into_iter().map(Into::into).collect();
        self.field(field, Comparison::In(set))
    }

    pub fn not_in<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let set = values.into_iter().map(Into::into).collect();
        self.field(field, Comparison::Nin(set))
    }

    /// Adds a logical-or group
    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.clauses.push(Clause::Or(filters));
        self
    }

    /// Adds a logical-and group
    pub fn and(mut self, filters: Vec<Filter>) -> Self {
        self.clauses.push(Clause::And(filters));
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Checks the structural invariants of the tree
    ///
    /// Field names must be non-empty; `in`/`nin` lists must not contain null;
    /// `or`/`and` groups must be non-empty lists of non-empty filters.
    pub fn validate(&self) -> Result<()> {
        for clause in &self.clauses {
            match clause {
                Clause::Field { field, comparison } => {
                    if field.trim().is_empty() {
                        return Err(invalid(format!(
                            "empty field name for operator '{}'",
                            comparison.operator()
                        )));
                    }
                    if let Comparison::In(set) | Comparison::Nin(set) = comparison {
                        if set.iter().any(Value::is_null) {
                            return Err(invalid(format!(
                                "'{}' on '{field}' contains null; use eq/ne null instead",
                                comparison.operator()
                            )));
                        }
                    }
                }
                Clause::Or(group) | Clause::And(group) => {
                    let op = if matches!(clause, Clause::Or(_)) {
                        Operator::Or
                    } else {
                        Operator::And
                    };
                    if group.is_empty() {
                        return Err(invalid(format!("'{op}' requires at least one filter")));
                    }
                    for sub in group {
                        if sub.is_empty() {
                            return Err(invalid(format!("'{op}' contains an empty filter")));
                        }
                        sub.validate()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Every field name referenced anywhere in the tree
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        let mut pending = vec![self];
        while let Some(filter) = pending.pop() {
            for clause in &filter.clauses {
                match clause {
                    Clause::Field { field, .. } => fields.push(field.as_str()),
                    Clause::Or(group) | Clause::And(group) => pending.extend(group.iter()),
                }
            }
        }
        fields
    }

    /// Evaluates the filter against an in-memory record
    ///
    /// Semantics follow the document store: `ne` and `nin` match absent fields,
    /// range operators never do, and `eq null` matches absent or null fields.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { field, comparison } => comparison.accepts(record.get(field)),
            Clause::Or(group) => group.iter().any(|f| f.matches(record)),
            Clause::And(group) => group.iter().all(|f| f.matches(record)),
        })
    }
}

fn invalid(message: String) -> BridgeError {
    StorageError::InvalidFilter(message).into()
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered list of sort keys; empty means backend-default order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    keys: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Descending));
        self
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Orders two records by the sort keys; absent values sort first
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, order) in &self.keys {
            let ordering = match (a.get(field), b.get(field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Options of a `find` call
///
/// Empty `columns` means all fields; `limit = 0` means unbounded; `skip` applies
/// after sorting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub columns: Vec<String>,
    pub sort: Sort,
    pub limit: u64,
    pub skip: u64,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }
}
