pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::database::{create_executor, QueryExecutor};
pub use services::macros::{ExpandedSql, FillValue, GapFill, MacroEngine};
pub use services::{
    fill_gaps, mask_credentials, Assembled, ConnectionPoolManager, QueryService,
    ResultAssembler,
};
