#![allow(clippy::missing_docs_in_private_items)]

pub mod refine;
pub mod search;

pub use refine::{refine, Chip};
pub use search::{search, Embedder, SearchFilters, SearchHit};
