//! Per-post metadata caching.
//!
//! This module holds the metadata half of the cache subsystem:
//!
//! * [`record`]: the [`PostMetadata`] data model and field-wise merge.
//! * [`reports`]: tolerant normalization of moderation report payloads.
//! * [`store`]: the [`MetadataStore`] with per-record JSON persistence
//!   and the submission index.

pub mod record;
pub mod reports;
pub mod store;

pub use record::{MetadataUpdate, ModerationStatus, PostMetadata};
pub use reports::{parse_reports, ReportSummary, UNPROCESSABLE_REPORT};
pub use store::MetadataStore;
