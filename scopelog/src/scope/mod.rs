//! Hierarchical scope tracking
//!
//! - `stack`: immutable [`ScopeStack`] and the [`Scope`] frames it holds
//! - `tracker`: task-local current stack, [`fork`]/[`spawn`] propagation and
//!   the [`ScopeTracker`] that fires push/pop notifications

pub mod stack;
pub mod tracker;

pub use stack::{Scope, ScopeStack};
pub use tracker::{
    current, current_names, fork, fork_sync, spawn, ScopeEvent, ScopeEventKind, ScopeGuard,
    ScopeTracker,
};
