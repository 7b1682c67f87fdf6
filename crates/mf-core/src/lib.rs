//! minifeed/crates/mf-core/src/lib.rs
//!
//! The domain models and port definitions shared by the feed engine and its plugins.

pub mod error;
pub mod keys;
pub mod models;
pub mod settings;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use settings::*;
pub use traits::*;
