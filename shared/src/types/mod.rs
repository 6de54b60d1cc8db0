//! Row, finding and predicate types

pub mod finding;
pub mod predicate;
pub mod snapshot;
