//! Shared data structures for the reporting dashboard
//!
//! - `keys`: typed join keys and selection dimensions
//! - `row`: untyped gateway rows and lenient field access
//! - `reference`: agencies and robots
//! - `reporting`: monthly reporting rows
//! - `evolution`: evolution requests, statuses, quotes
//! - `user`: authenticated users

mod evolution;
mod keys;
mod reference;
mod reporting;
mod row;
mod user;

pub use evolution::*;
pub use keys::*;
pub use reference::*;
pub use reporting::*;
pub use row::*;
pub use user::*;
