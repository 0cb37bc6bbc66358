mod types;
mod client;
mod error;
mod store;

pub use types::*;
pub use client::StoreClient;
pub use error::StoreError;
pub use store::{MemoryStore, ScheduleStore};
