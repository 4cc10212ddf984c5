//! Infrastructure layer for the employee portal.
//!
//! File-backed implementations of the persistence traits defined in
//! `portal-core`, plus configuration loading and path resolution.

pub mod config_service;
pub mod dto;
pub mod paths;
pub mod session_repository;
pub mod storage;

pub use config_service::ConfigService;
pub use paths::PortalPaths;
pub use session_repository::FileSessionRepository;
