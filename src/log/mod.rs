//! Transaction log model and sequential read abstraction
//!
//! The physical chunk files are an external concern; this module defines the
//! record variants that travel through the log and the sequential reader
//! contract the chaser tails, plus an in-memory log used by embedders and
//! the test suite.

pub mod reader;
pub mod record;
