pub mod assembler;
pub mod coercion;
pub mod connection_pool;
pub mod database; // Query executors per database type
pub mod macros; // $__ macro expansion and SQL dialects
pub mod query_service;

pub use assembler::*;
pub use connection_pool::*;
pub use query_service::*;
