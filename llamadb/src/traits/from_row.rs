//! FromRow trait for mapping result rows to Rust structs

use crate::error::Result;
use crate::row::Row;
use crate::traits::FromValue;

/// Trait for types that can be constructed from a result row.
///
/// # Example
///
/// ```
/// use llamadb::{FromRow, Result, Row};
///
/// pub struct User {
///     pub id: i64,
///     pub name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self {
///             id: row.get("id")?,
///             name: row.get("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Construct an instance of this type from a result row.
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

/// Tuples read columns by position, so `SELECT name, age` maps onto
/// `(String, i64)`.
macro_rules! tuple_row {
    ($($idx:tt $name:ident),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                Ok(($(row.get_at::<$name>($idx)?,)+))
            }
        }
    };
}

tuple_row!(0 A);
tuple_row!(0 A, 1 B);
tuple_row!(0 A, 1 B, 2 C);
tuple_row!(0 A, 1 B, 2 C, 3 D);
tuple_row!(0 A, 1 B, 2 C, 3 D, 4 E);
tuple_row!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
