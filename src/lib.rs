//! thingstore: client-side object cache and transactional write path for
//! engineering models
//!
//! Things (the nodes of an engineering model) are cached per session under
//! their identity key, edited through clone-based transactions, submitted
//! to a remote store as ordered operation sets, and announced to observers
//! on a change bus once the store has accepted them.

pub mod cli;
pub mod core;
pub mod entities;
