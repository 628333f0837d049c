pub mod audio;
pub mod clip;
pub mod config;
pub mod engine;
pub mod levels;
pub mod mixer;
pub mod pool;
pub mod process;
pub mod time;
pub mod timer;

pub use crate::clip::{ClipId, ClipState};
pub use crate::config::Config;
pub use crate::engine::{Engine, EngineError, EngineProcessor};
