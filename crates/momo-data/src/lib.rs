//! # MoMo Data
//!
//! In-memory dataset snapshot, the nearest-date query engine and the CSV
//! refresh source.
//!
//! ```text
//! DatasetSource (HTTP CSV + cache) ──► DatasetStore (ArcSwap snapshot)
//!                                            │
//!                         query::resolve(snapshot, selector, as_of) ──► Metric
//! ```

pub mod decode;
pub mod query;
pub mod source;
pub mod store;

pub use decode::{DecodeReport, decode_csv};
pub use query::resolve;
pub use source::{DatasetSource, HttpCsvSource};
pub use store::{DatasetStore, Snapshot};
