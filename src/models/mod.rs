pub mod database;
pub mod interval;
pub mod query;
pub mod result;
pub mod time_range;
pub mod value;

pub use database::*;
pub use interval::*;
pub use query::*;
pub use result::*;
pub use time_range::*;
pub use value::*;
