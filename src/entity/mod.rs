//! Typed rows returned by the session table queries.
//!
//! The table and its columns are named at runtime, so rows are decoded from raw
//! statements whose select lists alias every column to the field names below.

/// Row models for the session table.
pub mod session;
