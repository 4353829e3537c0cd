//! Scheduler/job/worker diagnostics dumps (§4.10 "Diagnostics").
//!
//! Repurposes the donor crate's `checkpoint.rs` — same postcard-encode,
//! checksum-verify, timestamped-file, retention-limited shape — but aimed at
//! periodic snapshots of live scheduler state for operational visibility
//! instead of pipeline restart/recovery. There is no restart path here: a
//! dump is read-only evidence, not something the engine resumes from.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, read_dir, remove_file, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::scheduler::SchedulerDiagnostics;

/// Where and how often diagnostics dumps are written.
#[derive(Clone, Debug)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Maximum number of dumps to retain per engine instance id (oldest deleted first).
    pub max_dumps: Option<usize>,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("./diagnostics"),
            max_dumps: Some(20),
        }
    }
}

/// One job's state, flattened into plain serializable fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: u64,
    pub kind: String,
    pub task_count: usize,
    pub completing: bool,
}

/// One worker's state, flattened into plain serializable fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_index: usize,
    pub queue_len: usize,
    pub conditional_len: usize,
    pub tasks_executed: u64,
    pub steals_performed: u64,
}

/// A single diagnostics dump: a timestamped, checksummed snapshot of every
/// live job and worker a scheduler knows about.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticsDump {
    pub instance_id: String,
    pub timestamp: u64,
    pub jobs: Vec<JobSnapshot>,
    pub workers: Vec<WorkerSnapshot>,
    /// SHA-256 checksum over the dump's job/worker summary line, for integrity
    /// verification on load (the same role `checkpoint.rs`'s `checksum` field
    /// played for restart state).
    pub checksum: String,
}

impl From<SchedulerDiagnostics> for DiagnosticsDump {
    fn from(d: SchedulerDiagnostics) -> Self {
        let jobs: Vec<JobSnapshot> = d
            .jobs
            .into_iter()
            .map(|j| JobSnapshot {
                job_id: j.job_id.raw(),
                kind: format!("{:?}", j.kind),
                task_count: j.task_count,
                completing: j.completing,
            })
            .collect();
        let workers: Vec<WorkerSnapshot> = d
            .workers
            .into_iter()
            .map(|w| WorkerSnapshot {
                worker_index: w.worker_index,
                queue_len: w.queue_len,
                conditional_len: w.conditional_len,
                tasks_executed: w.tasks_executed,
                steals_performed: w.steals_performed,
            })
            .collect();
        Self {
            instance_id: String::new(),
            timestamp: current_timestamp_ms(),
            checksum: summary_checksum(&jobs, &workers),
            jobs,
            workers,
        }
    }
}

fn summary_checksum(jobs: &[JobSnapshot], workers: &[WorkerSnapshot]) -> String {
    let line = format!(
        "{}:{}:{}",
        jobs.len(),
        workers.len(),
        jobs.iter().map(|j| j.task_count).sum::<usize>(),
    );
    compute_checksum(line.as_bytes())
}

/// Compute a SHA-256 hex digest of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Writes and reads [`DiagnosticsDump`]s to/from `config.directory`.
pub struct DiagnosticsWriter {
    config: DiagnosticsConfig,
}

impl DiagnosticsWriter {
    /// # Errors
    /// Returns an error if the diagnostics directory cannot be created.
    pub fn new(config: DiagnosticsConfig) -> Result<Self> {
        if config.enabled {
            create_dir_all(&config.directory).context("create diagnostics directory")?;
        }
        Ok(Self { config })
    }

    /// Snapshot `diagnostics` and write it to disk, tagged with `instance_id`.
    ///
    /// # Errors
    /// Returns an error if the dump cannot be serialized or written.
    pub fn dump(&self, instance_id: &str, diagnostics: SchedulerDiagnostics) -> Result<Option<PathBuf>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let mut dump = DiagnosticsDump::from(diagnostics);
        dump.instance_id = instance_id.to_string();

        let filename = format!("diag_{}_{}.bin", dump.instance_id, dump.timestamp);
        let path = self.config.directory.join(&filename);
        let encoded = postcard::to_allocvec(&dump).context("serialize diagnostics dump")?;
        let mut file = File::create(&path).context("create diagnostics file")?;
        file.write_all(&encoded).context("write diagnostics file")?;
        file.sync_all().context("sync diagnostics file")?;

        self.cleanup_old_dumps(&dump.instance_id)?;
        Ok(Some(path))
    }

    /// Load and verify a dump previously written by [`Self::dump`].
    ///
    /// # Errors
    /// Returns an error if the file can't be read, deserialized, or its
    /// checksum doesn't match its contents.
    pub fn load(&self, path: &Path) -> Result<DiagnosticsDump> {
        let mut file = File::open(path).context("open diagnostics file")?;
        let mut encoded = Vec::new();
        file.read_to_end(&mut encoded).context("read diagnostics file")?;
        let dump: DiagnosticsDump = postcard::from_bytes(&encoded).context("deserialize diagnostics dump")?;
        let expected = summary_checksum(&dump.jobs, &dump.workers);
        if expected != dump.checksum {
            bail!("diagnostics dump integrity check failed: checksum mismatch");
        }
        Ok(dump)
    }

    fn cleanup_old_dumps(&self, instance_id: &str) -> Result<()> {
        let Some(max_dumps) = self.config.max_dumps else {
            return Ok(());
        };
        let prefix = format!("diag_{instance_id}_");
        let mut dumps: Vec<_> = read_dir(&self.config.directory)
            .context("read diagnostics directory")?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_str().is_some_and(|name| name.starts_with(&prefix)))
            .collect();
        if dumps.len() <= max_dumps {
            return Ok(());
        }
        dumps.sort_by_key(|entry| entry.file_name().to_str().map(str::to_owned).unwrap_or_default());
        let to_delete = dumps.len() - max_dumps;
        for entry in dumps.iter().take(to_delete) {
            let _ = remove_file(entry.path());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;
    use crate::job::JobKind;
    use crate::scheduler::{JobDiagnostics, WorkerDiagnostics};

    fn sample() -> SchedulerDiagnostics {
        SchedulerDiagnostics {
            jobs: vec![JobDiagnostics {
                job_id: JobId::from_raw(1),
                kind: JobKind::Read,
                task_count: 3,
                completing: false,
            }],
            workers: vec![WorkerDiagnostics {
                worker_index: 0,
                queue_len: 2,
                conditional_len: 0,
                tasks_executed: 10,
                steals_performed: 1,
            }],
        }
    }

    #[test]
    fn dump_then_load_round_trips_and_verifies_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiagnosticsWriter::new(DiagnosticsConfig {
            enabled: true,
            directory: dir.path().to_path_buf(),
            max_dumps: Some(5),
        })
        .unwrap();
        let path = writer.dump("engine-1", sample()).unwrap().expect("enabled writer dumps");
        let loaded = writer.load(&path).unwrap();
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].task_count, 3);
        assert_eq!(loaded.workers[0].tasks_executed, 10);
    }

    #[test]
    fn disabled_writer_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiagnosticsWriter::new(DiagnosticsConfig {
            enabled: false,
            directory: dir.path().to_path_buf(),
            max_dumps: None,
        })
        .unwrap();
        assert!(writer.dump("engine-1", sample()).unwrap().is_none());
    }

    #[test]
    fn cleanup_retains_only_the_most_recent_max_dumps() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiagnosticsWriter::new(DiagnosticsConfig {
            enabled: true,
            directory: dir.path().to_path_buf(),
            max_dumps: Some(2),
        })
        .unwrap();
        for _ in 0..5 {
            writer.dump("engine-1", sample()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let remaining = read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }
}
