pub mod cluster_names;

pub use cluster_names::{cluster_records, deterministic_cluster_id};
