//! Run stamps: fingerprints that decide whether prior output can be reused.
//!
//! A stamp records the converter binary, the item's sources and the stage
//! chain. Skip-existing only trusts a run directory whose stamp matches the
//! current inputs.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use corpus_lab_core::SourceKind;
use corpus_lab_coverage::features::collect_source_files;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// File name of the stamp inside a run directory.
pub const STAMP_FILE: &str = "stamp.json";

/// Fingerprint of everything that determines a run's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
    pub converter_sha256: String,
    pub sources_sha256: String,
    pub stages: Vec<String>,
    /// When the stamp was written (RFC 3339). Not part of the fingerprint.
    #[serde(default)]
    pub created_at: String,
}

impl RunStamp {
    pub fn new(converter_sha256: String, sources_sha256: String, stages: Vec<String>) -> Self {
        Self {
            converter_sha256,
            sources_sha256,
            stages,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Returns `true` if both stamps describe the same inputs.
    pub fn matches(&self, other: &RunStamp) -> bool {
        self.converter_sha256 == other.converter_sha256
            && self.sources_sha256 == other.sources_sha256
            && self.stages == other.stages
    }

    /// Reads the stamp in `run_dir`, if there is a readable one.
    pub fn load(run_dir: &Path) -> Option<Self> {
        let path = run_dir.join(STAMP_FILE);
        let file = File::open(&path).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(stamp) => Some(stamp),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Ignoring unreadable stamp");
                None
            }
        }
    }

    /// Writes this stamp into `run_dir`.
    pub fn save(&self, run_dir: &Path) -> io::Result<()> {
        let file = File::create(run_dir.join(STAMP_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }
}

/// SHA-256 of a file's contents, as lowercase hex.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 over the item's source files in path order.
///
/// Each file contributes its path relative to `root` and its contents, so
/// renames, edits, additions and removals all change the digest. Unreadable
/// files contribute their path only.
pub fn sources_digest(root: &Path, kind: SourceKind) -> String {
    let mut hasher = Sha256::new();
    let files = if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        collect_source_files(root, kind, None)
    };
    for path in &files {
        let rel = path.strip_prefix(root).unwrap_or(path);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        if let Ok(bytes) = fs::read(path) {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
