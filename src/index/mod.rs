//! Committed stream index and its read path
//!
//! [`stream_index`] owns the hash-bucketed mapping of stream names to their
//! committed events and resolves hash collisions by exact name;
//! [`committer`] is the single-writer mutation seam driven by the chaser;
//! [`read_index`] is the concurrent read façade with the result-code
//! contract readers depend on.

pub mod committer;
pub mod read_index;
pub mod stream_index;
