//! Filter queries - selector based predicates for filterable repositories

pub mod query;
pub mod types;

pub use query::{FilterQuery, SqlParameter};
pub use types::{Conjunction, FilterCondition, FilterOperator};
