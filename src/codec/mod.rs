//! Bidirectional mapping between hierarchical [`Record`](crate::record::Record)s
//! and flat [`Row`](crate::table::Row)s.

pub mod flatten;
pub mod rebuild;
pub mod value;

pub use flatten::{flatten, FlattenOptions};
pub use rebuild::{rebuild, rebuild_at};
pub use value::{decode_value, encode_value, Decoded};

/// Cell text standing for an attribute that is present without a value.
///
/// The text is reserved: a text attribute whose value is literally `None`
/// reads back as having no value.
pub const NULL_MARKER: &str = "None";
