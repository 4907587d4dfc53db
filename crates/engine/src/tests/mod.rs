//! Crate-level tests for the reasoning loop.

pub(crate) mod stubs;
