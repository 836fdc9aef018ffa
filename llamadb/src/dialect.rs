//! SQL dialects: identifier quoting and placeholder style

use serde::{Deserialize, Serialize};

/// SQL syntax variant targeted by the query builder.
///
/// Dialects only differ in how identifiers are quoted and how positional
/// placeholders are spelled; clause syntax is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SqlDialect {
    /// SQLite: `"ident"`, `?`
    #[default]
    #[serde(rename = "sqlite", alias = "sqlite3")]
    Sqlite,
    /// MySQL / MariaDB: `` `ident` ``, `?`
    #[serde(rename = "mysql")]
    MySql,
    /// PostgreSQL: `"ident"`, `$1, $2, ...`
    #[serde(rename = "postgres", alias = "postgresql")]
    Postgres,
}

/// Words that are emitted quoted even though they are plain identifiers.
const RESERVED: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CHECK", "COLUMN", "CREATE",
    "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXISTS", "FOREIGN", "FROM",
    "GROUP", "HAVING", "IN", "INDEX", "INNER", "INSERT", "INTO", "IS", "JOIN", "KEY", "LEFT",
    "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "PRIMARY",
    "REFERENCES", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO", "TRANSACTION", "UNION",
    "UNIQUE", "UPDATE", "USER", "VALUES", "WHEN", "WHERE",
];

impl SqlDialect {
    pub fn name(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::MySql => "mysql",
            SqlDialect::Postgres => "postgres",
        }
    }

    /// Character used to delimit quoted identifiers.
    pub fn quote_char(&self) -> char {
        match self {
            SqlDialect::MySql => '`',
            SqlDialect::Sqlite | SqlDialect::Postgres => '"',
        }
    }

    /// Quote an identifier unconditionally, doubling embedded quote characters.
    pub fn quote_identifier(&self, ident: &str) -> String {
        let q = self.quote_char();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(q);
        for c in ident.chars() {
            if c == q {
                out.push(q);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    /// Render a table or column name.
    ///
    /// Plain identifiers are emitted bare; anything else (spaces, symbols,
    /// leading digits, reserved words) is quoted. Dotted names are handled
    /// per segment, and names that already start with a quote character
    /// are passed through.
    pub fn identifier(&self, name: &str) -> String {
        if name.starts_with(['"', '`', '[']) {
            return name.to_string();
        }
        name.split('.')
            .map(|segment| {
                if needs_quoting(segment) {
                    self.quote_identifier(segment)
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Render a table reference in a FROM or JOIN clause.
    ///
    /// A trailing alias (`users u` or `users AS u`) is split off: the table
    /// name goes through [`identifier`](Self::identifier) and the alias is
    /// emitted bare.
    pub fn table_reference(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.starts_with(['"', '`', '[']) {
            return reference.to_string();
        }
        let parts: Vec<&str> = reference.split_whitespace().collect();
        match parts.as_slice() {
            [table, alias] => format!("{} {}", self.identifier(table), alias),
            [table, keyword, alias] if keyword.eq_ignore_ascii_case("AS") => {
                format!("{} AS {}", self.identifier(table), alias)
            }
            _ => self.identifier(reference),
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::Sqlite | SqlDialect::MySql => "?".to_string(),
        }
    }

    /// Rewrite `?` placeholders into this dialect's style.
    ///
    /// Placeholders inside string literals and quoted identifiers are left
    /// alone. A no-op for `?`-style dialects.
    pub fn render_placeholders(&self, sql: &str) -> String {
        if *self != SqlDialect::Postgres {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        scan(sql, |c, in_quotes| {
            if c == '?' && !in_quotes {
                index += 1;
                out.push_str(&self.placeholder(index));
            } else {
                out.push(c);
            }
        });
        out
    }
}

/// Count `?` placeholders outside quoted literals.
pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan(sql, |c, in_quotes| {
        if c == '?' && !in_quotes {
            count += 1;
        }
    });
    count
}

/// Walk `sql` char by char, reporting whether each char sits inside a
/// `'...'`, `"..."` or `` `...` `` span. Doubled quotes stay inside the span.
fn scan(sql: &str, mut visit: impl FnMut(char, bool)) {
    let mut open: Option<char> = None;
    for c in sql.chars() {
        match open {
            Some(q) if c == q => {
                visit(c, true);
                open = None;
            }
            Some(_) => visit(c, true),
            None if matches!(c, '\'' | '"' | '`') => {
                visit(c, true);
                open = Some(c);
            }
            None => visit(c, false),
        }
    }
}

fn needs_quoting(segment: &str) -> bool {
    let mut chars = segment.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    !plain || RESERVED.iter().any(|w| w.eq_ignore_ascii_case(segment))
}
