pub mod artifacts;
pub mod batching;
pub mod clustering;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod models;
pub mod normalize;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{ResolveError, ResolveResult};
