//! Per-run execution context and scratch workspace
//!
//! `RunContext` carries everything a stage needs that is scoped to one run:
//! the run identity, the output directory, and the scratch workspace for
//! intermediate geometry artifacts. The scratch workspace is owned
//! exclusively by the run and is cleared on preparation, so a stale artifact
//! name from a previous run can never collide with this one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::RunManifest;
use crate::error::SynthResult;

/// Scratch directory for intermediate artifacts, scoped to one run
#[derive(Debug, Clone)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Create the scratch directory, clearing anything left by earlier runs
    pub fn prepare(root: PathBuf) -> SynthResult<Self> {
        if root.exists() {
            fs::remove_dir_all(&root)?;
            debug!("Cleared stale scratch workspace {}", root.display());
        }
        fs::create_dir_all(&root)?;
        Ok(ScratchWorkspace { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a job-scoped artifact, creating the job directory
    pub fn job_artifact(&self, job_label: &str, file_name: &str) -> SynthResult<PathBuf> {
        let job_dir = self.root.join(sanitize(job_label));
        fs::create_dir_all(&job_dir)?;
        Ok(job_dir.join(file_name))
    }

    /// Remove all artifacts, leaving an empty workspace
    pub fn clear(&self) -> SynthResult<()> {
        fs::remove_dir_all(&self.root)?;
        fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

/// Filesystem-safe job directory name
fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// State threaded through every stage of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub scratch: ScratchWorkspace,
}

impl RunContext {
    /// Prepare output and scratch directories for a fresh run
    pub fn prepare(manifest: &RunManifest) -> SynthResult<Self> {
        fs::create_dir_all(&manifest.output_dir)?;
        let scratch = ScratchWorkspace::prepare(manifest.scratch_dir.clone())?;
        Ok(RunContext {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            output_dir: manifest.output_dir.clone(),
            scratch,
        })
    }
}
