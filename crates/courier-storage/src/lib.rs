//! Courier Storage - Database and repository layer
//!
//! This crate provides:
//! - PostgreSQL connection pooling and migrations
//! - Repository traits with PostgreSQL and in-memory implementations
//! - The `Repositories` bundle the rest of the application works against

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;
pub mod store;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use store::Repositories;
