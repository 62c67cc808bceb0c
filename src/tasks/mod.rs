//! Delegated-task registry.
//!
//! Core components:
//! - `model`: TaskRecord, TaskStatus, truncation helpers
//! - `id`: `delegated_<node>_<hex>` identifier generation
//! - `store`: TaskStore, the single source of truth
//! - `dispatcher`: Dispatcher, background execution + completion recording
//! - `query`: QueryService (`list_tasks` / `get_task` / `mark_done`)
//! - `routes`: REST surface over the query service

pub mod dispatcher;
pub mod id;
pub mod model;
pub mod query;
pub mod routes;
pub mod store;

pub use dispatcher::Dispatcher;
pub use model::{TaskCounts, TaskEvent, TaskOutcome, TaskRecord, TaskStatus, TaskSummary};
pub use query::{QueryService, TaskListing, TaskOperation};
pub use store::TaskStore;
