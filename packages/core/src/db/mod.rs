//! Database Layer
//!
//! Persistence for work item types, work items, links and revisions:
//!
//! - [`store`] defines the traits the services program against
//! - [`PgStore`] implements them over PostgreSQL (JSONB field documents)
//! - [`InMemoryStore`] implements them over hash maps for tests and embedding
//! - [`fractional_ordering`] computes execution-order placements

mod error;
pub mod fractional_ordering;
mod memory;
pub mod postgres;
pub mod store;

pub use error::DatabaseError;
pub use fractional_ordering::{
    FractionalOrderCalculator, OrderPlacement, OrderedItem, ReorderDirection,
};
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::{
    LinkStore, Page, StoreResult, WorkItemStore, WorkItemTypeStore, DEFAULT_PAGE_LIMIT,
};
