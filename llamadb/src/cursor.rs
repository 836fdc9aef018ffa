//! Cursors over statement results

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::QueryOutput;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::traits::{FromRow, FromValue};

/// The result of one statement.
///
/// Rows are fetched in order and each row is handed out once. A cursor
/// shares a liveness flag with the connection that produced it; after the
/// connection closes every fetch fails with [`Error::ConnectionClosed`].
#[derive(Debug)]
pub struct Cursor {
    columns: Arc<[String]>,
    rows: VecDeque<Row>,
    rows_affected: u64,
    last_insert_id: Option<u64>,
    alive: Arc<AtomicBool>,
}

impl Cursor {
    pub(crate) fn new(output: QueryOutput, alive: Arc<AtomicBool>) -> Self {
        let columns = output.columns;
        let rows = output
            .rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self {
            columns,
            rows,
            rows_affected: output.rows_affected,
            last_insert_id: output.last_insert_id,
            alive,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    /// Next row, or `None` once the result is exhausted.
    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.check_open()?;
        Ok(self.rows.pop_front())
    }

    /// Up to `n` of the remaining rows.
    pub fn fetch_many(&mut self, n: usize) -> Result<Vec<Row>> {
        self.check_open()?;
        let n = n.min(self.rows.len());
        Ok(self.rows.drain(..n).collect())
    }

    /// All remaining rows.
    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.check_open()?;
        Ok(self.rows.drain(..).collect())
    }

    pub fn fetch_one_as<T: FromRow>(&mut self) -> Result<Option<T>> {
        self.fetch_one()?.map(|row| T::from_row(&row)).transpose()
    }

    pub fn fetch_all_as<T: FromRow>(&mut self) -> Result<Vec<T>> {
        self.fetch_all()?.iter().map(T::from_row).collect()
    }

    /// First column of the next row.
    ///
    /// Fails with [`Error::ColumnNotFound`] when there is no row left.
    pub fn fetch_scalar<T: FromValue>(&mut self) -> Result<T> {
        let row = self
            .fetch_one()?
            .ok_or_else(|| Error::ColumnNotFound("#0 (empty result)".to_string()))?;
        row.get_at(0)
    }

    /// Rows changed by an INSERT, UPDATE or DELETE.
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Id generated by the last INSERT, if the driver reported one.
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Column names; empty for statements that return no rows.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows not fetched yet.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn cursor(alive: &Arc<AtomicBool>) -> Cursor {
        let output = QueryOutput {
            columns: vec!["id".to_string(), "name".to_string()].into(),
            rows: (1..=5)
                .map(|i| vec![Value::I64(i), Value::String(format!("user{}", i))])
                .collect(),
            rows_affected: 0,
            last_insert_id: None,
        };
        Cursor::new(output, Arc::clone(alive))
    }

    #[test]
    fn fetches_consume_rows_in_order() {
        let alive = Arc::new(AtomicBool::new(true));
        let mut cur = cursor(&alive);
        assert_eq!(cur.columns(), ["id", "name"]);

        let first = cur.fetch_one().unwrap().unwrap();
        assert_eq!(first.get::<i64>("id").unwrap(), 1);

        let batch = cur.fetch_many(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].get::<String>("name").unwrap(), "user3");

        assert_eq!(cur.fetch_many(10).unwrap().len(), 2);
        assert!(cur.fetch_one().unwrap().is_none());
        assert!(cur.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn scalar_reads_first_column() {
        let alive = Arc::new(AtomicBool::new(true));
        let mut cur = cursor(&alive);
        assert_eq!(cur.fetch_scalar::<i64>().unwrap(), 1);
        cur.fetch_all().unwrap();
        assert!(matches!(
            cur.fetch_scalar::<i64>(),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn closed_connection_invalidates_cursor() {
        let alive = Arc::new(AtomicBool::new(true));
        let mut cur = cursor(&alive);
        alive.store(false, Ordering::Release);
        assert!(matches!(cur.fetch_one(), Err(Error::ConnectionClosed)));
        assert!(matches!(cur.fetch_all(), Err(Error::ConnectionClosed)));
        assert_eq!(cur.remaining(), 5);
    }
}
