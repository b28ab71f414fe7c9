pub mod engine;
pub mod linebuffer;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod viewer;

pub use engine::{EngineStats, SyncEngine};
