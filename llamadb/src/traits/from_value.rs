//! FromValue trait for converting database values to Rust types

use crate::error::{Error, Result};
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Trait for types that can be constructed from a database value.
///
/// SQLite has no native boolean or temporal types, so the implementations
/// here also accept the integer and text encodings those columns come back
/// in.
pub trait FromValue: Sized {
    /// Convert a database value to this type.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::TypeConversion {
        expected,
        actual: value.type_name().to_string(),
    }
}

fn out_of_range(expected: &'static str, shown: impl std::fmt::Display) -> Error {
    Error::TypeConversion {
        expected,
        actual: format!("{} out of range", shown),
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::I64(v) => Ok(v != 0),
            Value::U64(v) => Ok(v != 0),
            _ => Err(mismatch("bool", &value)),
        }
    }
}

macro_rules! from_value_int {
    ($($t:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::I64(v) => {
                            <$t>::try_from(v).map_err(|_| out_of_range($name, format!("i64({})", v)))
                        }
                        Value::U64(v) => {
                            <$t>::try_from(v).map_err(|_| out_of_range($name, format!("u64({})", v)))
                        }
                        Value::Bool(v) => Ok(<$t>::from(v)),
                        _ => Err(mismatch($name, &value)),
                    }
                }
            }
        )*
    };
}

from_value_int!(
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::F64(v) => Ok(v),
            Value::I64(v) => Ok(v as f64),
            Value::U64(v) => Ok(v as f64),
            _ => Err(mismatch("f64", &value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(v) => Ok(v),
            Value::Bytes(v) => String::from_utf8(v).map_err(|e| Error::TypeConversion {
                expected: "utf8 string",
                actual: format!("invalid utf8: {}", e),
            }),
            _ => Err(mismatch("string", &value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::String(v) => Ok(v.into_bytes()),
            _ => Err(mismatch("bytes", &value)),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(v) => Ok(v),
            Value::DateTime(v) => Ok(v.date()),
            Value::String(ref s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDateTime::from_value(value.clone()).map(|dt| dt.date()))
                .map_err(|_| Error::TypeConversion {
                    expected: "date",
                    actual: format!("unparseable date string: {}", s),
                }),
            _ => Err(mismatch("date", &value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            Value::String(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&s, fmt).ok())
                .ok_or_else(|| Error::TypeConversion {
                    expected: "datetime",
                    actual: format!("unparseable datetime string: {}", s),
                }),
            _ => Err(mismatch("datetime", &value)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Time(v) => Ok(v),
            Value::DateTime(v) => Ok(v.time()),
            Value::String(s) => {
                NaiveTime::parse_from_str(&s, "%H:%M:%S%.f").map_err(|_| Error::TypeConversion {
                    expected: "time",
                    actual: format!("unparseable time string: {}", s),
                })
            }
            _ => Err(mismatch("time", &value)),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            Value::I64(v) => Ok(Decimal::from(v)),
            Value::U64(v) => Ok(Decimal::from(v)),
            Value::F64(v) => Decimal::try_from(v).map_err(|_| out_of_range("decimal", v)),
            Value::String(v) => v.parse().map_err(|_| Error::TypeConversion {
                expected: "decimal",
                actual: format!("invalid decimal string: {}", v),
            }),
            _ => Err(mismatch("decimal", &value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v),
            Value::String(v) => serde_json::from_str(&v).map_err(|e| Error::TypeConversion {
                expected: "json",
                actual: format!("invalid json: {}", e),
            }),
            _ => Err(mismatch("json", &value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            _ => Ok(Some(T::from_value(value)?)),
        }
    }
}
