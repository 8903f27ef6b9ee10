//! Task lifecycle states for the lease protocol.
//!
//! Transitions are enforced by the task store's conditional updates; this
//! module only defines the vocabulary and the allowed edges.

pub mod states;

pub use states::TaskStatus;
