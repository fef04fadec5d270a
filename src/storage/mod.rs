// src/storage/mod.rs
pub mod mock;
pub mod postgres;
pub mod query;
pub mod traits;

pub use mock::{MockOp, MockStore};
pub use postgres::PostgresStore;
pub use query::{ConfigError, Identifier, QueryTemplate};
pub use traits::{Credentials, PolicyStore, StoreConnection, StoreError};
