pub mod memory;
pub mod state_storage;

// Re-export the modules here for easy import elsewhere.
pub use memory::*;
pub use state_storage::*;
