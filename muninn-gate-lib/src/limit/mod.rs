//! Token-bucket admission state: per-key buckets behind one bounded map.

mod bucket;
mod queue;
mod store;

pub use store::{Admission, BucketStore};
