//! Query execution module
//!
//! This module contains the option-set protocol, the planner that turns it
//! into typed queries, SQL generation and the driver that runs them.

pub mod driver;
pub mod options;
pub mod planner;
pub mod sql;

pub use driver::Driver;
pub use options::OptionSet;
pub use planner::{Binding, ListingQuery, LookupQuery, Page, PageConfig};
