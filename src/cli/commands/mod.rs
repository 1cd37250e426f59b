//! Command implementations

pub mod completions;
pub mod delete;
pub mod init;
pub mod link;
pub mod list;
pub mod new;
pub mod set;
pub mod show;
pub mod status;
