pub mod api_client;
pub mod config;
pub mod error;
pub mod progress_authority;
pub mod session_store;
pub mod settings_repository;
pub mod storage;
pub mod task_repository;
pub mod user_repository;
