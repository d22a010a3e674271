pub mod client;
pub mod memory;
mod record;
pub mod repository;

pub use client::DbClient;
pub use memory::MemoryStore;
pub use repository::{DbError, Repository, Result};
