//! Filter grammar to parameterized SQL
//!
//! Every value becomes a bound `$n` parameter and every identifier is quoted. Column
//! names are checked against the introspected table before they reach the SQL text.

use crate::domain::{
    Clause, Comparison, Filter, FindOptions, Record, Result, SortOrder, StorageError,
};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::error::Error as StdError;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A JSON value bound as a statement parameter
///
/// The wire encoding is chosen from the parameter type Postgres inferred for the
/// placeholder, so one value can be compared against text, numeric, boolean,
/// timestamp and JSON columns.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonParam(pub Value);

fn mismatch(value: &Value, ty: &Type) -> Box<dyn StdError + Sync + Send> {
    format!("cannot bind {value} as {ty}").into()
}

impl ToSql for JsonParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let value = &self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => value
                .as_bool()
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::INT2 => {
                let n = value.as_i64().ok_or_else(|| mismatch(value, ty))?;
                i16::try_from(n)?.to_sql(ty, out)
            }
            Type::INT4 => {
                let n = value.as_i64().ok_or_else(|| mismatch(value, ty))?;
                i32::try_from(n)?.to_sql(ty, out)
            }
            Type::INT8 => value
                .as_i64()
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::FLOAT4 => {
                let f = value.as_f64().ok_or_else(|| mismatch(value, ty))?;
                (f as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => value
                .as_f64()
                .ok_or_else(|| mismatch(value, ty))?
                .to_sql(ty, out),
            Type::TIMESTAMPTZ => {
                let raw = value.as_str().ok_or_else(|| mismatch(value, ty))?;
                DateTime::parse_from_rfc3339(raw)?
                    .with_timezone(&Utc)
                    .to_sql(ty, out)
            }
            Type::TIMESTAMP => {
                let raw = value.as_str().ok_or_else(|| mismatch(value, ty))?;
                DateTime::parse_from_rfc3339(raw)?
                    .naive_utc()
                    .to_sql(ty, out)
            }
            Type::DATE => {
                let raw = value.as_str().ok_or_else(|| mismatch(value, ty))?;
                let day = raw.get(..10).unwrap_or(raw);
                NaiveDate::parse_from_str(day, "%Y-%m-%d")?.to_sql(ty, out)
            }
            Type::UUID => {
                let raw = value.as_str().ok_or_else(|| mismatch(value, ty))?;
                uuid::Uuid::parse_str(raw)?.to_sql(ty, out)
            }
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            _ => match value {
                Value::String(s) => s.as_str().to_sql(ty, out),
                other => other.to_string().to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// SQL fragment plus its bound parameters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<JsonParam>,
}

impl SqlQuery {
    pub fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

/// Quotes an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One introspected column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Types decoded directly; everything else is selected as text
    fn is_native(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "boolean"
                | "smallint"
                | "integer"
                | "bigint"
                | "real"
                | "double precision"
                | "text"
                | "character varying"
                | "character"
                | "name"
                | "uuid"
                | "json"
                | "jsonb"
                | "timestamp with time zone"
                | "timestamp without time zone"
                | "date"
                | "bytea"
        )
    }
}

/// Builds statements for one table, rejecting columns the table does not have
pub struct StatementBuilder<'a> {
    table: &'a str,
    columns: &'a [ColumnInfo],
}

impl<'a> StatementBuilder<'a> {
    pub fn new(table: &'a str, columns: &'a [ColumnInfo]) -> Self {
        Self { table, columns }
    }

    fn lookup(&self, name: &str) -> Result<&'a ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                StorageError::UnknownColumn {
                    table: self.table.to_string(),
                    column: name.to_string(),
                }
                .into()
            })
    }

    fn column(&self, name: &str) -> Result<String> {
        self.lookup(name).map(|c| quote_ident(&c.name))
    }

    fn select_item(column: &ColumnInfo) -> String {
        let quoted = quote_ident(&column.name);
        if column.is_native() {
            quoted
        } else {
            format!("{quoted}::text AS {quoted}")
        }
    }

    fn select_list(&self, requested: &[String]) -> Result<String> {
        let items = if requested.is_empty() {
            self.columns.iter().map(Self::select_item).collect::<Vec<_>>()
        } else {
            requested
                .iter()
                .map(|name| self.lookup(name).map(Self::select_item))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(items.join(", "))
    }

    /// `WHERE` body for a filter; `TRUE` for the empty filter
    pub fn where_clause(&self, filter: &Filter, params: &mut Vec<JsonParam>) -> Result<String> {
        filter.validate()?;
        if filter.is_empty() {
            return Ok("TRUE".to_string());
        }
        let parts = filter
            .clauses()
            .iter()
            .map(|clause| self.clause(clause, params))
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(" AND "))
    }

    fn clause(&self, clause: &Clause, params: &mut Vec<JsonParam>) -> Result<String> {
        match clause {
            Clause::Field { field, comparison } => {
                let column = self.column(field)?;
                Ok(comparison_sql(&column, comparison, params))
            }
            Clause::Or(filters) => self.group(filters, " OR ", params),
            Clause::And(filters) => self.group(filters, " AND ", params),
        }
    }

    fn group(
        &self,
        filters: &[Filter],
        joiner: &str,
        params: &mut Vec<JsonParam>,
    ) -> Result<String> {
        let parts = filters
            .iter()
            .map(|f| self.where_clause(f, params).map(|sql| format!("({sql})")))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("({})", parts.join(joiner)))
    }

    fn order_by(&self, options: &FindOptions) -> Result<String> {
        if options.sort.is_empty() {
            return Ok(String::new());
        }
        let keys = options
            .sort
            .keys()
            .iter()
            .map(|(field, order)| {
                let direction = match order {
                    SortOrder::Ascending => "ASC",
                    SortOrder::Descending => "DESC",
                };
                self.column(field).map(|c| format!("{c} {direction}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" ORDER BY {}", keys.join(", ")))
    }

    /// `SELECT ... WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
    pub fn select(&self, filter: &Filter, options: &FindOptions) -> Result<SqlQuery> {
        let mut params = Vec::new();
        let where_sql = self.where_clause(filter, &mut params)?;
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}{}",
            self.select_list(&options.columns)?,
            quote_ident(self.table),
            where_sql,
            self.order_by(options)?
        );
        if options.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", options.limit));
        }
        if options.skip > 0 {
            sql.push_str(&format!(" OFFSET {}", options.skip));
        }
        Ok(SqlQuery { sql, params })
    }

    /// Single-row select; limit and skip from `options` are ignored
    pub fn select_one(&self, filter: &Filter, options: &FindOptions) -> Result<SqlQuery> {
        let mut single = options.clone();
        single.limit = 1;
        single.skip = 0;
        self.select(filter, &single)
    }

    /// `INSERT`; returns the `id` column as text when the table has one
    pub fn insert(&self, record: &Record) -> Result<SqlQuery> {
        let mut names = Vec::with_capacity(record.len());
        let mut params = Vec::with_capacity(record.len());
        for (field, value) in record {
            names.push(self.column(field)?);
            params.push(JsonParam(value.clone()));
        }

        let placeholders = (1..=params.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let returning = if self.columns.iter().any(|c| c.name == "id") {
            " RETURNING \"id\"::text"
        } else {
            ""
        };

        let sql = if names.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES{}", quote_ident(self.table), returning)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                quote_ident(self.table),
                names.join(", "),
                placeholders,
                returning
            )
        };
        Ok(SqlQuery { sql, params })
    }

    /// Partial update of the first row matching the filter
    ///
    /// Rows are addressed through `ctid` so exactly one row changes, matching
    /// the document store's `updateOne`.
    pub fn update_one(&self, filter: &Filter, fields: &Record) -> Result<SqlQuery> {
        if fields.is_empty() {
            return Err(StorageError::InvalidFilter("update with no fields".to_string()).into());
        }
        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(fields.len());
        for (field, value) in fields {
            let column = self.column(field)?;
            params.push(JsonParam(value.clone()));
            assignments.push(format!("{column} = ${}", params.len()));
        }
        let where_sql = self.where_clause(filter, &mut params)?;
        let table = quote_ident(self.table);
        let sql = format!(
            "UPDATE {table} SET {} WHERE ctid = (SELECT ctid FROM {table} WHERE {where_sql} LIMIT 1)",
            assignments.join(", ")
        );
        Ok(SqlQuery { sql, params })
    }

    pub fn delete_one(&self, filter: &Filter) -> Result<SqlQuery> {
        let mut params = Vec::new();
        let where_sql = self.where_clause(filter, &mut params)?;
        let table = quote_ident(self.table);
        let sql = format!(
            "DELETE FROM {table} WHERE ctid = (SELECT ctid FROM {table} WHERE {where_sql} LIMIT 1)"
        );
        Ok(SqlQuery { sql, params })
    }

    pub fn delete_many(&self, filter: &Filter) -> Result<SqlQuery> {
        let mut params = Vec::new();
        let where_sql = self.where_clause(filter, &mut params)?;
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(self.table), where_sql);
        Ok(SqlQuery { sql, params })
    }
}

fn bind(params: &mut Vec<JsonParam>, value: &Value) -> String {
    params.push(JsonParam(value.clone()));
    format!("${}", params.len())
}

fn bind_list(params: &mut Vec<JsonParam>, values: &[Value]) -> String {
    values
        .iter()
        .map(|v| bind(params, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One comparison with document-store null semantics
///
/// A missing value is SQL `NULL`: `ne` and `nin` accept it, equality with null
/// means `IS NULL`.
fn comparison_sql(column: &str, comparison: &Comparison, params: &mut Vec<JsonParam>) -> String {
    match comparison {
        Comparison::Eq(Value::Null) => format!("{column} IS NULL"),
        Comparison::Ne(Value::Null) => format!("{column} IS NOT NULL"),
        Comparison::Eq(v) => format!("{column} = {}", bind(params, v)),
        Comparison::Ne(v) => format!("{column} IS DISTINCT FROM {}", bind(params, v)),
        Comparison::Gt(v) => format!("{column} > {}", bind(params, v)),
        Comparison::Gte(v) => format!("{column} >= {}", bind(params, v)),
        Comparison::Lt(v) => format!("{column} < {}", bind(params, v)),
        Comparison::Lte(v) => format!("{column} <= {}", bind(params, v)),
        Comparison::In(values) if values.is_empty() => "FALSE".to_string(),
        Comparison::In(values) => format!("{column} IN ({})", bind_list(params, values)),
        Comparison::Nin(values) if values.is_empty() => "TRUE".to_string(),
        Comparison::Nin(values) => format!(
            "({column} IS NULL OR {column} NOT IN ({}))",
            bind_list(params, values)
        ),
    }
}
