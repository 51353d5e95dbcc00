//! Product metadata and barcode resolution.
//!
//! A barcode is answered from the hot cache or the local product table when
//! possible; otherwise external sources are asked in priority order and the
//! first answer is remembered locally for every later scan.

pub mod resolver;
pub mod seed;
pub mod sources;
pub mod table;
pub mod types;

pub use resolver::{Lookup, LookupSource, ProductResolver};
pub use table::ProductTable;
pub use types::{is_valid_barcode, ProductRecord};
