//! Virtual-table bridge.
//!
//! Sits between DataFusion and a Veneer adapter: negotiates which predicates
//! are pushed down, opens cursors over adapter rows with type coercion, and
//! exposes every table as a `TableProvider`. Tables can also be
//! named by URI directly in SQL.

pub mod convert;
pub mod cursor;
pub mod engine;
pub mod exec;
pub mod expr;
pub mod index;
pub mod ordering;
pub mod provider;
pub mod schema;
pub mod table;

pub use cursor::Cursor;
pub use engine::Engine;
pub use exec::VirtualScanExec;
pub use index::{best_index, Committed, ConstraintUsage, IndexPlan};
pub use ordering::PushSortIntoScan;
pub use provider::VirtualTableProvider;
pub use schema::VirtualSchema;
pub use table::VirtualTable;
