#![deny(missing_docs)]
//! Mutation merger and chain executor for interpose.
//!
//! A [`Chain`] is the ordered, immutable list of modules bound to one
//! (route, leg). The [`ChainExecutor`] runs it against one envelope:
//! modules are invoked strictly in order, one at a time, and each result
//! is folded into the envelope by [`merge`] before the next module sees
//! it. The first failure short-circuits the chain; the chain's
//! [`FailurePolicy`](interpose_types::FailurePolicy) decides whether that
//! aborts the message or lets it through with the last good envelope.

pub mod executor;
pub mod merge;

pub use executor::{Chain, ChainExecutor, ChainStep};
pub use merge::merge;
