//!
//! # Shared API types
//!
//! Building blocks referenced by more than one custom resource.
//!
mod condition;
mod consumers;
mod reference;
mod selector;

pub use condition::*;
pub use consumers::*;
pub use reference::*;
pub use selector::*;
