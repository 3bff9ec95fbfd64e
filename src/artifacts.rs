// src/artifacts.rs - CSV checkpoint artifacts and the keyed record store

use crate::error::{ResolveError, ResolveResult};
use crate::models::core::{Batch, Cluster, ClusterStatus, EnrichedCluster, RawRecord};
use crate::models::stats::RunStats;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Read raw records from a user-supplied CSV. The column holding the raw
/// name is selected by header name, falling back to the first column.
///
/// Blank rows are dropped, logged, and counted; they never abort the run.
/// Returns the surviving records and the dropped-row count.
pub fn read_raw_records(
    path: &Path,
    name_column: Option<&str>,
) -> ResolveResult<(Vec<RawRecord>, usize)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column_index = match name_column {
        Some(name) => headers.iter().position(|h| h == name).ok_or_else(|| {
            ResolveError::Validation(format!("column '{}' not found in input CSV", name))
        })?,
        None => 0,
    };
    let column_name = headers
        .get(column_index)
        .unwrap_or("<unnamed>")
        .to_string();
    info!("Ingest: reading names from column '{}'", column_name);

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for (row_idx, row) in reader.records().enumerate() {
        let row = row?;
        let raw_name = row.get(column_index).unwrap_or("").trim();
        if raw_name.is_empty() {
            debug!("Ingest: dropping blank row {}", row_idx + 1);
            dropped += 1;
            continue;
        }
        records.push(RawRecord {
            id: row_idx as u64 + 1,
            raw_name: raw_name.to_string(),
            source: Some(column_name.clone()),
        });
    }

    info!(
        "Ingest: {} records read, {} blank rows dropped",
        records.len(),
        dropped
    );
    Ok((records, dropped))
}

/// Serialized form of a cluster in the cluster and batch artifacts: one row
/// per cluster with members joined into single fields.
#[derive(Debug, Serialize, Deserialize)]
struct ClusterRow {
    cluster_id: String,
    representative_name: String,
    canonical_key: String,
    member_count: usize,
    member_ids: String,
    member_raw_names: String,
}

impl ClusterRow {
    fn from_cluster(cluster: &Cluster, raw_names: &HashMap<u64, &str>) -> Self {
        let member_ids: Vec<String> = cluster.member_ids.iter().map(|id| id.to_string()).collect();
        let member_raw_names: Vec<&str> = cluster
            .member_ids
            .iter()
            .filter_map(|id| raw_names.get(id).copied())
            .collect();
        Self {
            cluster_id: cluster.cluster_id.clone(),
            representative_name: cluster.representative_name.clone(),
            canonical_key: cluster.canonical_key.clone(),
            member_count: cluster.member_ids.len(),
            member_ids: member_ids.join(";"),
            member_raw_names: member_raw_names.join("; "),
        }
    }

    fn into_cluster(self) -> Cluster {
        let member_ids: BTreeSet<u64> = self
            .member_ids
            .split(';')
            .filter_map(|id| id.trim().parse().ok())
            .collect();
        Cluster {
            cluster_id: self.cluster_id,
            representative_name: self.representative_name,
            canonical_key: self.canonical_key,
            member_ids,
        }
    }
}

/// Write the normalized+clustered artifact: one row per cluster.
pub fn write_cluster_artifact(
    path: &Path,
    clusters: &[Cluster],
    records: &[RawRecord],
) -> ResolveResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw_names: HashMap<u64, &str> = records
        .iter()
        .map(|r| (r.id, r.raw_name.as_str()))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;
    for cluster in clusters {
        writer.serialize(ClusterRow::from_cluster(cluster, &raw_names))?;
    }
    writer.flush()?;
    info!(
        "Artifacts: wrote {} clusters to {}",
        clusters.len(),
        path.display()
    );
    Ok(())
}

/// Read a cluster artifact back. Member raw names are informational and are
/// not reconstructed.
pub fn read_cluster_artifact(path: &Path) -> ResolveResult<Vec<Cluster>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut clusters = Vec::new();
    for row in reader.deserialize() {
        let row: ClusterRow = row?;
        clusters.push(row.into_cluster());
    }
    Ok(clusters)
}

fn batch_file_name(batch_id: u32) -> String {
    format!("batch_{:03}.csv", batch_id)
}

fn parse_batch_id(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("batch_")?
        .parse()
        .ok()
}

/// Write one artifact file per batch, same schema as the cluster artifact,
/// scoped to that batch's clusters. Enables independent, resumable
/// enrichment per batch.
pub fn write_batch_artifacts(
    dir: &Path,
    batches: &[Batch],
    clusters: &[Cluster],
    records: &[RawRecord],
) -> ResolveResult<()> {
    fs::create_dir_all(dir)?;
    let by_id: HashMap<&str, &Cluster> = clusters
        .iter()
        .map(|c| (c.cluster_id.as_str(), c))
        .collect();
    let raw_names: HashMap<u64, &str> = records
        .iter()
        .map(|r| (r.id, r.raw_name.as_str()))
        .collect();

    for batch in batches {
        let path = dir.join(batch_file_name(batch.batch_id));
        let mut writer = csv::Writer::from_path(&path)?;
        for cluster_id in &batch.cluster_ids {
            if let Some(cluster) = by_id.get(cluster_id.as_str()) {
                writer.serialize(ClusterRow::from_cluster(cluster, &raw_names))?;
            }
        }
        writer.flush()?;
    }
    info!(
        "Artifacts: wrote {} batch files to {}",
        batches.len(),
        dir.display()
    );
    Ok(())
}

/// Read batch artifacts from a directory, reconstructing the batch sequence
/// and the clusters they reference. Batch ids are parsed out of the file
/// names rather than re-derived from sort position, so the write-time
/// assignment survives even past the zero-padding width (batch_1000.csv
/// sorts before batch_999.csv lexicographically).
pub fn read_batch_artifacts(dir: &Path) -> ResolveResult<(Vec<Batch>, Vec<Cluster>)> {
    let mut ids_and_paths: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
        .filter_map(|p| parse_batch_id(&p).map(|id| (id, p)))
        .collect();
    ids_and_paths.sort_by_key(|(id, _)| *id);

    let mut batches = Vec::new();
    let mut clusters = Vec::new();
    for (batch_id, path) in &ids_and_paths {
        let mut reader = csv::Reader::from_path(path)?;
        let mut cluster_ids = Vec::new();
        for row in reader.deserialize() {
            let row: ClusterRow = row?;
            cluster_ids.push(row.cluster_id.clone());
            clusters.push(row.into_cluster());
        }
        batches.push(Batch {
            batch_id: *batch_id,
            cluster_ids,
        });
    }
    Ok((batches, clusters))
}

/// Write the end-of-run summary as a JSON artifact next to the CSV outputs.
pub fn write_run_summary(path: &Path, stats: &RunStats) -> ResolveResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(stats)?;
    fs::write(path, json)?;
    info!("Artifacts: wrote run summary to {}", path.display());
    Ok(())
}

/// Keyed record store for enrichment output: the checkpoint/resume layer.
///
/// Reads for resumability happen before any worker starts; writes happen
/// only through the synchronized append path owned by the orchestrator. The
/// same orchestrator logic runs against a CSV file or an in-memory store.
pub trait RecordStore: Send {
    fn read_all(&self) -> ResolveResult<Vec<EnrichedCluster>>;
    fn append(&mut self, row: &EnrichedCluster) -> ResolveResult<()>;
    /// Replace the whole store contents. Used to compact the artifact after
    /// a retry pass leaves superseded rows behind.
    fn rewrite(&mut self, rows: &[EnrichedCluster]) -> ResolveResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct EnrichedRow {
    cluster_id: String,
    representative_name: String,
    chosen_url: String,
    confidence: f64,
    status: String,
}

impl From<&EnrichedCluster> for EnrichedRow {
    fn from(row: &EnrichedCluster) -> Self {
        Self {
            cluster_id: row.cluster_id.clone(),
            representative_name: row.representative_name.clone(),
            chosen_url: row.chosen_url.clone().unwrap_or_default(),
            confidence: row.confidence,
            status: row.status.as_str().to_string(),
        }
    }
}

/// Append-oriented CSV store. The header is written once, when the file is
/// created; later appends add bare rows so the artifact stays valid across
/// resumed runs.
pub struct CsvRecordStore {
    path: PathBuf,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for CsvRecordStore {
    fn read_all(&self) -> ResolveResult<Vec<EnrichedCluster>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            let row: EnrichedRow = row?;
            let status = match ClusterStatus::parse(&row.status) {
                Some(status) => status,
                None => {
                    warn!(
                        "Store: skipping row for {} with unknown status '{}'",
                        row.cluster_id, row.status
                    );
                    continue;
                }
            };
            rows.push(EnrichedCluster {
                cluster_id: row.cluster_id,
                representative_name: row.representative_name,
                chosen_url: if row.chosen_url.is_empty() {
                    None
                } else {
                    Some(row.chosen_url)
                },
                confidence: row.confidence,
                status,
            });
        }
        Ok(rows)
    }

    fn append(&mut self, row: &EnrichedCluster) -> ResolveResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let needs_header = !self.path.exists()
            || self.path.metadata().map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(EnrichedRow::from(row))?;
        writer.flush()?;
        Ok(())
    }

    fn rewrite(&mut self, rows: &[EnrichedCluster]) -> ResolveResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        for row in rows {
            writer.serialize(EnrichedRow::from(row))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Vec<EnrichedCluster>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<EnrichedCluster>) -> Self {
        Self { rows }
    }
}

impl RecordStore for MemoryStore {
    fn read_all(&self) -> ResolveResult<Vec<EnrichedCluster>> {
        Ok(self.rows.clone())
    }

    fn append(&mut self, row: &EnrichedCluster) -> ResolveResult<()> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn rewrite(&mut self, rows: &[EnrichedCluster]) -> ResolveResult<()> {
        self.rows = rows.to_vec();
        Ok(())
    }
}
