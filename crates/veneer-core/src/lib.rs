//! Veneer core: the value model, constraint algebra, cost model and the
//! adapter contract shared by every data source.

pub mod adapter;
pub mod coerce;
pub mod combine;
pub mod cost;
pub mod error;
pub mod filter;
pub mod registry;
pub mod value;

pub use adapter::{Adapter, Column, Columns, Row, RowStream};
pub use combine::{apply_equivalence, combine, Basis, EpochSeconds, Equivalence};
pub use cost::{CostModel, SortKey};
pub use error::{Result, SourceError, VeneerError};
pub use filter::{
    reduce, Bound, Bounds, ColumnFilter, Constraint, Filter, FilterKind, Nullability, Operator,
    Range,
};
pub use registry::{AdapterFactory, AdapterOptions, AdapterRegistry};
pub use value::{ColumnType, Order, OrderSupport, Value};
