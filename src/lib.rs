//! Umbrella package hosting the workspace-level integration tests.
//!
//! Re-exports the workspace crates so the tests under `tests/` exercise
//! them exactly as an embedding application would.

pub use opal_core;
pub use opal_host;
pub use opal_seq;
