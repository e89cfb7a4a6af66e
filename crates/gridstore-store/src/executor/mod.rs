//! Database providers implementing the executor ports.

pub mod mock;
pub mod postgres;

pub use mock::MockDatabase;
pub use postgres::{PgDatabase, PgOptions};
