//! `tgstore` Core Library
//!
//! Shared functionality for the `tgstore` session storage:
//! - Configuration loading
//! - Connection pool construction (`PostgreSQL` and `SQLite`)
//! - Wall clock abstraction
//! - Common error types

pub mod clock;
pub mod config;
pub mod db;
pub mod error;

pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use db::{Backend, StorePool};
pub use error::{Error, Result};
