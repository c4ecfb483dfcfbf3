//! Data models for GitMind

pub mod conflict;
pub mod diff;
pub mod events;
pub mod repository;
pub mod status;

pub use conflict::*;
pub use diff::*;
pub use events::*;
pub use repository::*;
pub use status::*;
