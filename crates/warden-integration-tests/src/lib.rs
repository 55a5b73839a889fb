//! Integration tests for the Warden admission-control pipeline.
//!
//! The scenarios live in `tests/`; this crate intentionally exports
//! nothing.
