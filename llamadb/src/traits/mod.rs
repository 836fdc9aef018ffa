//! Core traits for llamadb

mod from_row;
mod from_value;
mod into_params;
mod to_value;

pub use from_row::FromRow;
pub use from_value::FromValue;
pub use into_params::IntoParams;
pub use to_value::ToValue;
