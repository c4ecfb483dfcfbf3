//! Service layer for GitMind
//!
//! This module contains the services that sit between the raw git
//! operations and the application: status polling, folder monitoring,
//! diff generation and the repository model cache.

pub mod cache_service;
pub mod cancellation;
pub mod debounce;
pub mod diff_parser;
pub mod diff_service;
pub mod git_service;
pub mod repository_service;
pub mod status_service;
pub mod watcher_service;

pub use cache_service::CacheService;
pub use cancellation::CancellationToken;
pub use debounce::{DebounceConfig, Debouncer};
pub use diff_parser::DiffParser;
pub use git_service::{GitRunner, GitStatusProvider, StatusProvider};
pub use repository_service::RepositoryService;
pub use status_service::{PauseGuard, StatusService};
pub use watcher_service::FolderMonitor;
