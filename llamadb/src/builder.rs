//! Fluent SQL builder
//!
//! [`QueryBuilder`] accumulates clauses through chained calls and renders a
//! parameterized [`Query`] for a target [`SqlDialect`]. Misuse is recorded
//! as it happens and reported by [`QueryBuilder::build`], so a chain never
//! has to be interrupted by `?`.
//!
//! ```
//! use llamadb::{QueryBuilder, Value};
//!
//! let query = QueryBuilder::new()
//!     .select("*")
//!     .from_table("users")
//!     .where_clause("age > ?", 30)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.sql(), "SELECT * FROM users WHERE age > ?");
//! assert_eq!(query.params(), &[Value::I64(30)]);
//! ```

use std::fmt;

use crate::dialect::{count_placeholders, SqlDialect};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::traits::{IntoParams, ToValue};
use crate::value::Value;

/// Column lists accepted by `select`, `group_by` and `columns`.
pub trait IntoColumns {
    fn into_columns(self) -> Vec<String>;
}

impl IntoColumns for &str {
    fn into_columns(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoColumns for String {
    fn into_columns(self) -> Vec<String> {
        vec![self]
    }
}

impl<S: Into<String>, const N: usize> IntoColumns for [S; N] {
    fn into_columns(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<S: Into<String>> IntoColumns for Vec<S> {
    fn into_columns(self) -> Vec<String> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<S: AsRef<str>> IntoColumns for &[S] {
    fn into_columns(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone)]
struct Join {
    keyword: &'static str,
    table: String,
    on: String,
}

#[derive(Debug, Clone)]
struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    fn check(&self, clause: &str) -> Result<()> {
        let placeholders = count_placeholders(&self.sql);
        if placeholders != self.params.len() {
            return Err(Error::BuildValidation(format!(
                "{} predicate `{}` has {} placeholder(s) but {} value(s)",
                clause,
                self.sql,
                placeholders,
                self.params.len()
            )));
        }
        Ok(())
    }
}

/// Mutable accumulator for SELECT, INSERT, UPDATE and DELETE statements.
///
/// Every method takes and returns the builder. `build()` borrows it, so the
/// same builder can be rendered repeatedly and always yields the same
/// query.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    dialect: SqlDialect,
    kind: Option<StatementKind>,
    select: Vec<String>,
    table: Option<String>,
    joins: Vec<Join>,
    wheres: Vec<Predicate>,
    group_by: Vec<String>,
    havings: Vec<Predicate>,
    order_by: Vec<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    assignments: Vec<(String, Value)>,
    misuse: Option<String>,
}

impl QueryBuilder {
    /// Create a builder targeting SQLite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder targeting the given dialect.
    pub fn with_dialect(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn record(&mut self, problem: String) {
        if self.misuse.is_none() {
            self.misuse = Some(problem);
        }
    }

    fn start(mut self, kind: StatementKind) -> Self {
        match self.kind {
            None => self.kind = Some(kind),
            Some(current) if current == kind => {}
            Some(current) => self.record(format!(
                "cannot start a {} statement on a {} builder",
                kind, current
            )),
        }
        self
    }

    fn require(&mut self, kind: StatementKind, method: &str) {
        if self.kind != Some(kind) {
            let found = self
                .kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "empty".to_string());
            self.record(format!(
                "`{}` is only valid on an {} builder, found {}",
                method, kind, found
            ));
        }
    }

    // ---- SELECT ----

    /// Add select-list expressions. Expressions are emitted verbatim.
    pub fn select(mut self, columns: impl IntoColumns) -> Self {
        self.select.extend(columns.into_columns());
        self.start(StatementKind::Select)
    }

    /// Set the source table of a SELECT.
    pub fn from_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.start(StatementKind::Select)
    }

    /// `INNER JOIN table ON condition`
    pub fn join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            keyword: "JOIN",
            table: table.into(),
            on: on.into(),
        });
        self
    }

    /// `LEFT JOIN table ON condition`
    pub fn left_join(mut self, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.joins.push(Join {
            keyword: "LEFT JOIN",
            table: table.into(),
            on: on.into(),
        });
        self
    }

    /// Append a predicate using `?` placeholders.
    ///
    /// Predicates from repeated calls are joined with `AND` in call order.
    pub fn where_clause(mut self, predicate: impl Into<String>, params: impl IntoParams) -> Self {
        self.wheres.push(Predicate {
            sql: predicate.into(),
            params: params.into_params(),
        });
        self
    }

    /// Append `column IN (?, ...)`. An empty list matches no rows.
    pub fn where_in(self, column: &str, values: impl IntoParams) -> Self {
        let values = values.into_params();
        if values.is_empty() {
            return self.where_clause("1 = 0", ());
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let predicate = format!("{} IN ({})", column, placeholders);
        self.where_clause(predicate, values)
    }

    pub fn group_by(mut self, columns: impl IntoColumns) -> Self {
        self.group_by.extend(columns.into_columns());
        self
    }

    /// Append a HAVING predicate; same rules as [`where_clause`](Self::where_clause).
    pub fn having(mut self, predicate: impl Into<String>, params: impl IntoParams) -> Self {
        self.havings.push(Predicate {
            sql: predicate.into(),
            params: params.into_params(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), false));
        self
    }

    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push((column.into(), true));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    // ---- INSERT ----

    /// Start an INSERT into `table`.
    pub fn insert(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.start(StatementKind::Insert)
    }

    /// Set the INSERT column list.
    pub fn columns(mut self, columns: impl IntoColumns) -> Self {
        self.require(StatementKind::Insert, "columns");
        self.columns.extend(columns.into_columns());
        self
    }

    /// Add one row of values. Call repeatedly for a multi-row INSERT.
    pub fn values(mut self, row: impl IntoParams) -> Self {
        self.require(StatementKind::Insert, "values");
        self.rows.push(row.into_params());
        self
    }

    // ---- UPDATE / DELETE ----

    /// Start an UPDATE of `table`.
    pub fn update(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.start(StatementKind::Update)
    }

    /// Add a `column = ?` assignment to an UPDATE.
    pub fn set(mut self, column: impl Into<String>, value: impl ToValue) -> Self {
        self.require(StatementKind::Update, "set");
        self.assignments.push((column.into(), value.to_value()));
        self
    }

    /// Start a DELETE from `table`.
    pub fn delete(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.start(StatementKind::Delete)
    }

    // ---- rendering ----

    /// Render the SQL text without taking the parameters.
    pub fn get_sql(&self) -> Result<String> {
        self.build().map(|query| query.into_parts().0)
    }

    /// Validate the accumulated clauses and render the query.
    pub fn build(&self) -> Result<Query> {
        if let Some(problem) = &self.misuse {
            return Err(Error::BuildValidation(problem.clone()));
        }
        let kind = self
            .kind
            .ok_or_else(|| Error::BuildValidation("no statement to build".to_string()))?;

        if kind != StatementKind::Select {
            self.reject_select_only(kind)?;
        }
        for predicate in &self.wheres {
            predicate.check("WHERE")?;
        }
        for predicate in &self.havings {
            predicate.check("HAVING")?;
        }

        let mut params = Vec::new();
        let sql = match kind {
            StatementKind::Select => self.render_select(&mut params),
            StatementKind::Insert => self.render_insert(&mut params)?,
            StatementKind::Update => self.render_update(&mut params)?,
            StatementKind::Delete => self.render_delete(&mut params)?,
        };

        Ok(Query::from_parts(self.dialect.render_placeholders(&sql), params))
    }

    fn reject_select_only(&self, kind: StatementKind) -> Result<()> {
        let clause = if !self.joins.is_empty() {
            "JOIN"
        } else if !self.group_by.is_empty() {
            "GROUP BY"
        } else if !self.havings.is_empty() {
            "HAVING"
        } else if !self.order_by.is_empty() {
            "ORDER BY"
        } else if self.limit.is_some() || self.offset.is_some() {
            "LIMIT/OFFSET"
        } else if kind == StatementKind::Insert && !self.wheres.is_empty() {
            "WHERE"
        } else if !self.select.is_empty() {
            "select list"
        } else {
            return Ok(());
        };
        Err(Error::BuildValidation(format!(
            "{} is not supported on an {} statement",
            clause, kind
        )))
    }

    fn table(&self, kind: StatementKind) -> Result<String> {
        self.table
            .as_deref()
            .map(|t| self.dialect.identifier(t))
            .ok_or_else(|| Error::BuildValidation(format!("{} requires a table", kind)))
    }

    fn render_select(&self, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");
        if self.select.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select.join(", "));
        }
        if let Some(table) = &self.table {
            sql.push_str(" FROM ");
            sql.push_str(&self.dialect.table_reference(table));
        }
        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                join.keyword,
                self.dialect.table_reference(&join.table),
                join.on
            ));
        }
        self.render_predicates(&mut sql, " WHERE ", &self.wheres, params);
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        self.render_predicates(&mut sql, " HAVING ", &self.havings, params);
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, desc)| {
                    if *desc {
                        format!("{} DESC", column)
                    } else {
                        column.clone()
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }
        self.render_limit(&mut sql);
        sql
    }

    fn render_limit(&self, sql: &mut String) {
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {}", limit));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            // SQLite and MySQL only accept OFFSET after a LIMIT
            (None, Some(offset)) => match self.dialect {
                SqlDialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                SqlDialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                SqlDialect::MySql => {
                    sql.push_str(&format!(" LIMIT {} OFFSET {}", u64::MAX, offset))
                }
            },
            (None, None) => {}
        }
    }

    fn render_predicates(
        &self,
        sql: &mut String,
        keyword: &str,
        predicates: &[Predicate],
        params: &mut Vec<Value>,
    ) {
        if predicates.is_empty() {
            return;
        }
        let wrap = predicates.len() > 1;
        let parts: Vec<String> = predicates
            .iter()
            .map(|p| {
                if wrap && has_top_level_or(&p.sql) {
                    format!("({})", p.sql)
                } else {
                    p.sql.clone()
                }
            })
            .collect();
        sql.push_str(keyword);
        sql.push_str(&parts.join(" AND "));
        for predicate in predicates {
            params.extend(predicate.params.iter().cloned());
        }
    }

    fn render_insert(&self, params: &mut Vec<Value>) -> Result<String> {
        let table = self.table(StatementKind::Insert)?;
        if self.columns.is_empty() {
            return Err(Error::BuildValidation(
                "INSERT requires at least one column".to_string(),
            ));
        }
        if self.rows.is_empty() {
            return Err(Error::BuildValidation(
                "INSERT requires at least one row of values".to_string(),
            ));
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::BuildValidation(format!(
                    "INSERT row {} has {} value(s) but {} column(s) were given",
                    i + 1,
                    row.len(),
                    self.columns.len()
                )));
            }
        }

        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| self.dialect.identifier(c))
            .collect();
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let tuples = vec![tuple.as_str(); self.rows.len()].join(", ");
        for row in &self.rows {
            params.extend(row.iter().cloned());
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            tuples
        ))
    }

    fn render_update(&self, params: &mut Vec<Value>) -> Result<String> {
        let table = self.table(StatementKind::Update)?;
        if self.assignments.is_empty() {
            return Err(Error::BuildValidation(
                "UPDATE requires at least one `set`".to_string(),
            ));
        }
        let assignments: Vec<String> = self
            .assignments
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!("{} = ?", self.dialect.identifier(column))
            })
            .collect();
        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        self.render_predicates(&mut sql, " WHERE ", &self.wheres, params);
        Ok(sql)
    }

    fn render_delete(&self, params: &mut Vec<Value>) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", self.table(StatementKind::Delete)?);
        self.render_predicates(&mut sql, " WHERE ", &self.wheres, params);
        Ok(sql)
    }
}

/// True when `sql` contains an `OR` keyword outside parentheses and quotes.
fn has_top_level_or(sql: &str) -> bool {
    let upper = sql.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth -= 1,
                b'O' if depth == 0 && bytes.get(i + 1) == Some(&b'R') => {
                    let before = i == 0 || !is_word_byte(bytes[i - 1]);
                    let after = bytes.get(i + 2).map_or(true, |c| !is_word_byte(*c));
                    if before && after {
                        return true;
                    }
                }
                _ => {}
            },
        }
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
