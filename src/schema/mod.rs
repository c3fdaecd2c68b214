//! Struct-layout knowledge consumed by the splitter.
//!
//! The codec never interprets payload fields itself.  Everything it needs to
//! know about a record's layout comes through [`SchemaBroker`], which lets
//! tests inject a fake and lets a layout-reconciling engine plug in without
//! touching the codec.

pub mod sdna;

pub use sdna::{SchemaTable, TableBroker};

use crate::error::Result;

/// How a record's stored layout relates to the layout the broker targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructCompare {
    /// No layout information (no schema, or index out of range).
    Unknown,
    /// The struct no longer exists in the target layout.
    Removed,
    /// Byte layout identical; pass the payload through.
    Unchanged,
    /// Layout differs; the payload must be rebuilt with `reconstruct`.
    Changed,
}

pub trait SchemaBroker {
    fn classify(&self, schema_index: i32) -> StructCompare;

    /// Rebuild `count` elements of `raw` into the target layout.  Only called
    /// after `classify` returned [`StructCompare::Changed`].
    fn reconstruct(&self, schema_index: i32, count: i32, raw: &[u8]) -> Result<Vec<u8>>;

    /// Raw type name; may not be UTF-8.
    fn name_of(&self, schema_index: i32) -> Option<&[u8]>;

    /// True when the struct's first member is a named-entity header.
    fn has_leading_identity(&self, schema_index: i32) -> bool;

    /// The entity name stored in `payload`, for structs with a leading identity.
    fn identity_name(&self, schema_index: i32, payload: &[u8]) -> Option<Vec<u8>>;
}
