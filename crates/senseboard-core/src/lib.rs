//! `senseboard-core` — runtime configuration, shared identifiers, and the
//! server-wide error taxonomy.
//!
//! Everything here is passive: no I/O beyond reading the config file, no
//! tokio dependency. Subsystem crates pull their knobs and constants from
//! this crate so the whole server is configured in one place.

pub mod config;
pub mod error;
pub mod lexicon;
pub mod types;

pub use config::SenseConfig;
pub use error::{Result, SenseError};
