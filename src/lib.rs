pub mod config;
pub mod format;
pub mod output;
pub mod sampler;
pub mod system;
