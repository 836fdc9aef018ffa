//! Connection parameters and pool settings

pub mod defaults;
mod params;
mod settings;

pub use params::ConnectionParams;
pub use settings::{PoolSettings, Settings};
