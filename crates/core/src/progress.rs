//! Durable ingestion state: the page checkpoint and the page journal.
//!
//! The checkpoint is replaced atomically (write to a sibling temp file, then
//! rename). The journal is append-only JSON lines, one line per committed
//! page, and is always written before the checkpoint that covers it.

use crate::error::IngestError;
use crate::models::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestionProgress {
    pub last_page: u32,
    pub total_documents: usize,
    pub last_update: Option<DateTime<Utc>>,
}

pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable checkpoints start from page zero.
    pub fn load(&self) -> IngestionProgress {
        if !self.path.exists() {
            return IngestionProgress::default();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(IngestError::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(IngestError::from));

        match parsed {
            Ok(progress) => progress,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "checkpoint unreadable, starting over");
                IngestionProgress::default()
            }
        }
    }

    /// Stamps `last_update` and replaces the checkpoint file.
    pub fn save(&self, progress: &mut IngestionProgress) -> Result<(), IngestError> {
        progress.last_update = Some(Utc::now());
        let serialized = serde_json::to_string_pretty(progress)?;

        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, serialized)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), IngestError> {
        remove_if_exists(&self.path)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    page: u32,
    documents: Vec<Document>,
}

pub struct PageJournal {
    path: PathBuf,
}

impl PageJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, page: u32, documents: &[Document]) -> Result<(), IngestError> {
        let entry = serde_json::to_string(&JournalEntry {
            page,
            documents: documents.to_vec(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        // a torn tail from a crashed run must not swallow this entry
        if ends_mid_line(&mut file)? {
            file.write_all(b"\n")?;
        }
        writeln!(file, "{entry}")?;
        file.sync_data()?;
        Ok(())
    }

    /// Documents of every journaled page up to and including `through_page`,
    /// in page order.
    ///
    /// Lines past the checkpoint were written by a run that died before
    /// committing them, and a torn final line is what a crash mid-write
    /// leaves behind; both are skipped. A torn line may end inside a
    /// multi-byte character, so lines are decoded from raw bytes. A page
    /// journaled twice (crash between journal and checkpoint) keeps its
    /// last entry.
    pub fn replay(&self, through_page: u32) -> Result<Vec<Document>, IngestError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut pages: BTreeMap<u32, Vec<Document>> = BTreeMap::new();

        for (line_no, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<JournalEntry>(&line) {
                Ok(entry) if entry.page <= through_page => {
                    pages.insert(entry.page, entry.documents);
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(line = line_no + 1, %error, "skipping torn journal line");
                }
            }
        }

        Ok(pages.into_values().flatten().collect())
    }

    pub fn clear(&self) -> Result<(), IngestError> {
        remove_if_exists(&self.path)
    }
}

fn ends_mid_line(file: &mut fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn remove_if_exists(path: &Path) -> Result<(), IngestError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
