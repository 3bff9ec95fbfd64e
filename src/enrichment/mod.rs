pub mod orchestrator;
pub mod scoring;
pub mod search;

pub use orchestrator::{run_enrichment, EnrichmentOptions};
pub use search::{
    CandidateSearch, HttpPageFetch, HttpSearch, PageFetch, StaticPageFetch, StaticSearch,
};
