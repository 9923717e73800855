//! Listing core: data model for directory listing submissions.
//!
//! Jobs, product snapshots, directory descriptors, detected forms and the
//! structured results of a submission run. Pure data, no I/O.

pub mod eligibility;
pub mod error;
pub mod product;
pub mod types;

pub use eligibility::{is_fresh_eligible, is_retry_eligible, next_status_after, retry_order};
pub use error::{ErrorKind, SubmissionError};
pub use product::{ProductAttribute, ProductSnapshot};
pub use types::*;
