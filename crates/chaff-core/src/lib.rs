//! chaff-core: types shared by every chaff crate
//!
//! - `error`: the single typed error (`ChaffError`) every operation reports
//! - `config`: `chaff.toml` schema
//! - `types`: peer endpoints

pub mod config;
pub mod error;
pub mod types;

pub use config::ChaffConfig;
pub use error::{ChaffError, ChaffResult};
pub use types::PeerEndpoint;
