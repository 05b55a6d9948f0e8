//! quillwork library crate
//!
//! Turns free-form model responses into schema-conformant structured data for
//! the writing workspace: sanitizing, reshaping, validating, and asking the
//! model for corrections within a fixed retry budget.

pub mod config;
pub mod reconcile;
pub mod util;
