//! Bulk-load pipeline: directory walker (producer) and concurrent insertion workers.

pub mod bulk;
pub mod walker;
