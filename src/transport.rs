//! Hands the packaged files back to the caller, either inline as base64 or as
//! paths to files written under a run-scoped directory.

use crate::config::Delivery;
use crate::config::GeneratorConfig;
use crate::error::RosterError;
use crate::package::Package;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tracing::debug;
use tracing::warn;

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Process-wide sequence keeping run ids distinct within one millisecond
static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Content of a delivered file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", content = "content", rename_all = "camelCase")]
pub enum ArtifactContent {
    /// Standard base64 with padding
    Inline(String),
    /// Path relative to the configured root, always with `/` separators
    Reference(String),
}

/// A named, typed file of the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    pub content_type: String,
    #[serde(flatten)]
    pub content: ArtifactContent,
}

impl Artifact {
    /// Recovers the delivered bytes. Reference paths are resolved against `root`.
    pub fn bytes(&self, root: Option<&Path>) -> Result<Vec<u8>, RosterError> {
        match &self.content {
            ArtifactContent::Inline(text) => Ok(STANDARD.decode(text)?),
            ArtifactContent::Reference(path) => {
                let root = root.ok_or_else(|| {
                    RosterError::ConfigError(format!("no root to resolve reference '{}'", path))
                })?;
                Ok(fs::read(root.join(path))?)
            }
        }
    }
}

/// Everything produced by one successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamsResult {
    pub run_id: String,
    /// Workbook with one sheet per team
    pub combined: Artifact,
    /// Zip archive of the per-team workbooks
    pub archive: Artifact,
    /// Per-team workbooks in team order
    pub teams: Vec<Artifact>,
}

/// Generates `<UTC milliseconds>-<process sequence>-<4 hex digits>`.
pub fn new_run_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let millis = Utc::now().timestamp_millis();
    let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{:04x}", millis, sequence, rng.gen::<u16>())
}

/// Wraps the packaged files as artifacts delivered the configured way.
pub fn deliver(package: Package, run_id: String, config: &GeneratorConfig) -> Result<TeamsResult, RosterError> {
    let mut files: Vec<(String, &'static str, Vec<u8>)> = Vec::with_capacity(package.teams.len() + 2);
    files.push((config.combined_file_name.to_owned(), XLSX_CONTENT_TYPE, package.combined));
    files.push((config.archive_file_name.to_owned(), ZIP_CONTENT_TYPE, package.archive));
    for file in package.teams {
        files.push((file.name, XLSX_CONTENT_TYPE, file.bytes));
    }

    let mut artifacts = match &config.delivery {
        Delivery::Inline => encode_inline(files),
        Delivery::Reference { root } => write_references(root, &run_id, files)?,
    }
    .into_iter();

    let (Some(combined), Some(archive)) = (artifacts.next(), artifacts.next()) else {
        return Err(RosterError::Serialization("missing combined files".to_owned()));
    };
    Ok(TeamsResult {
        run_id,
        combined,
        archive,
        teams: artifacts.collect(),
    })
}

fn encode_inline(files: Vec<(String, &'static str, Vec<u8>)>) -> Vec<Artifact> {
    files
        .into_iter()
        .map(|(name, content_type, bytes)| Artifact {
            content: ArtifactContent::Inline(STANDARD.encode(&bytes)),
            content_type: content_type.to_owned(),
            name,
        })
        .collect()
}

/// Writes every file into a fresh `root/<run_id>` directory.
/// The directory must not exist yet; on any failure it is removed again.
fn write_references(root: &Path, run_id: &str, files: Vec<(String, &'static str, Vec<u8>)>) -> Result<Vec<Artifact>, RosterError> {
    fs::create_dir_all(root)?;
    let directory = root.join(run_id);
    fs::create_dir(&directory)?;

    let result = files
        .into_iter()
        .map(|(name, content_type, bytes)| -> Result<Artifact, RosterError> {
            let mut file = OpenOptions::new().write(true).create_new(true).open(directory.join(&name))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            Ok(Artifact {
                content: ArtifactContent::Reference(format!("{}/{}", run_id, name)),
                content_type: content_type.to_owned(),
                name,
            })
        })
        .collect::<Result<Vec<Artifact>, RosterError>>();

    match result {
        Ok(artifacts) => {
            debug!(directory = %directory.display(), files = artifacts.len(), "wrote artifacts");
            Ok(artifacts)
        }
        Err(error) => {
            if let Err(cleanup) = fs::remove_dir_all(&directory) {
                warn!(directory = %directory.display(), error = %cleanup, "failed to remove partial run directory");
            }
            Err(error)
        }
    }
}
