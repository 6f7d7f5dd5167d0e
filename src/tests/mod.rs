//! Consolidated test modules.
//!
//! End-to-end cleanup passes against the in-memory platform.
