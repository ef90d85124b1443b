//! Batch inspection
//!
//! Inspects many image files on a fixed pool of scoped worker threads. Jobs
//! are fed through a bounded channel and results come back tagged with their
//! input position, so output order matches input order.

use crossbeam_channel::{bounded, unbounded};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::InspectionResult;
use crate::error::InspectError;
use crate::pipeline::Inspector;
use crate::vision::RecognitionConfig;

/// Why a single file in a batch produced no verdict
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error("File was not processed")]
    NotProcessed,
}

/// Outcome for one input file
#[derive(Debug)]
pub struct BatchOutcome {
    pub path: PathBuf,
    pub result: Result<InspectionResult, BatchError>,
}

/// Default worker count: available parallelism, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Inspect every file in `paths` against the same part
pub fn inspect_all(
    inspector: &Inspector,
    paths: &[PathBuf],
    part_id: &str,
    config: &RecognitionConfig,
    workers: usize,
) -> Vec<BatchOutcome> {
    if paths.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, paths.len());
    let start = Instant::now();
    info!(
        "Inspecting {} files as '{}' with {} workers",
        paths.len(),
        part_id,
        workers
    );

    let (job_tx, job_rx) = bounded::<(usize, &Path)>(workers * 2);
    let (result_tx, result_rx) = unbounded::<(usize, Result<InspectionResult, BatchError>)>();

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (index, path) in job_rx.iter() {
                    let result = inspect_file(inspector, path, part_id, config);
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
                debug!("Batch worker {} finished", worker);
            });
        }
        drop(job_rx);
        drop(result_tx);

        for (index, path) in paths.iter().enumerate() {
            if job_tx.send((index, path.as_path())).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    let mut slots: Vec<Option<Result<InspectionResult, BatchError>>> =
        paths.iter().map(|_| None).collect();
    for (index, result) in result_rx.iter() {
        slots[index] = Some(result);
    }

    info!("Batch of {} files done in {:?}", paths.len(), start.elapsed());

    paths
        .iter()
        .zip(slots)
        .map(|(path, slot)| BatchOutcome {
            path: path.clone(),
            result: slot.unwrap_or(Err(BatchError::NotProcessed)),
        })
        .collect()
}

/// Read and inspect one file
fn inspect_file(
    inspector: &Inspector,
    path: &Path,
    part_id: &str,
    config: &RecognitionConfig,
) -> Result<InspectionResult, BatchError> {
    let bytes = std::fs::read(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(inspector.inspect(&bytes, part_id, config)?)
}
