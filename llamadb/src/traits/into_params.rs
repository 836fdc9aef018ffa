//! IntoParams trait for passing positional parameters to statements

use crate::traits::ToValue;
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Anything that can be turned into an ordered list of statement parameters.
///
/// Implemented for `()` (no parameters), single scalar values, tuples of up
/// to eight values, arrays, slices and vectors. Values bind to `?`
/// placeholders in order.
///
/// ```
/// use llamadb::{IntoParams, Value};
///
/// assert_eq!(().into_params(), Vec::<Value>::new());
/// assert_eq!(30i64.into_params(), vec![Value::I64(30)]);
/// assert_eq!(("bob", 30).into_params().len(), 2);
/// ```
pub trait IntoParams {
    /// Convert into positional parameters.
    fn into_params(self) -> Vec<Value>;
}

impl IntoParams for () {
    fn into_params(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! scalar_params {
    ($($t:ty),*) => {
        $(
            impl IntoParams for $t {
                fn into_params(self) -> Vec<Value> {
                    vec![self.to_value()]
                }
            }
        )*
    };
}

scalar_params!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    &str,
    Value,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    Decimal,
    serde_json::Value
);

impl<T: ToValue> IntoParams for Option<T> {
    fn into_params(self) -> Vec<Value> {
        vec![self.to_value()]
    }
}

impl<T: ToValue> IntoParams for Vec<T> {
    fn into_params(self) -> Vec<Value> {
        self.iter().map(ToValue::to_value).collect()
    }
}

impl<T: ToValue> IntoParams for &[T] {
    fn into_params(self) -> Vec<Value> {
        self.iter().map(ToValue::to_value).collect()
    }
}

impl<T: ToValue, const N: usize> IntoParams for [T; N] {
    fn into_params(self) -> Vec<Value> {
        self.iter().map(ToValue::to_value).collect()
    }
}

macro_rules! tuple_params {
    ($($name:ident),+) => {
        impl<$($name: ToValue),+> IntoParams for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_params(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.to_value()),+]
            }
        }
    };
}

tuple_params!(A);
tuple_params!(A, B);
tuple_params!(A, B, C);
tuple_params!(A, B, C, D);
tuple_params!(A, B, C, D, E);
tuple_params!(A, B, C, D, E, F);
tuple_params!(A, B, C, D, E, F, G);
tuple_params!(A, B, C, D, E, F, G, H);
