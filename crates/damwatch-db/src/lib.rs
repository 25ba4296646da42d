//! Durable store for the damwatch historical acquisition pipeline.
//!
//! This crate owns the PostgreSQL side of the system: the connection pool
//! wrapper, embedded migrations, and the models the pipeline reads and
//! writes. The acquisition job row is the system-of-record for job state;
//! the instrument and reading models are the narrow contract into the
//! wider monitoring backend.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::DbPool;
