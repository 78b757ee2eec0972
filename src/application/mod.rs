// Application layer - use cases and orchestration over the repository.

pub mod config;
pub mod directory;
pub mod error;
pub mod locks;
pub mod service;

pub use config::*;
pub use directory::*;
pub use error::*;
pub use locks::*;
pub use service::*;
