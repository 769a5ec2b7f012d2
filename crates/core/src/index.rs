//! Flat inner-product index over unit vectors, persisted next to its corpus.
//!
//! Blob layout, all little-endian:
//! `b"MDIX"`, version `u32`, dimensions `u32`, count `u64`, `count * dimensions`
//! `f32` values, then the SHA-256 of every preceding byte.

use crate::config::DataPaths;
use crate::embeddings::{dot, l2_normalize, Embedder};
use crate::error::{EmbedError, IndexError};
use crate::models::{Document, FieldCategory, ScoredIndex};
use crate::traits::VectorIndex;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use tracing::{info, warn};

pub const EMBED_BATCH_SIZE: usize = 100;

const MAGIC: &[u8; 4] = b"MDIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;
const CHECKSUM_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    pub build_date: DateTime<Utc>,
    pub total_documents: usize,
    pub embedding_model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsFileRef<'a> {
    documents: &'a [Document],
    #[serde(flatten)]
    metadata: &'a IndexMetadata,
    field_structure: Vec<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsFile {
    documents: Vec<Document>,
    #[serde(flatten)]
    metadata: IndexMetadata,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    paths: DataPaths,
    dimensions: usize,
    vectors: Vec<f32>,
    documents: Vec<Document>,
    metadata: Option<IndexMetadata>,
}

impl IndexStore {
    pub fn new(paths: DataPaths) -> Self {
        Self {
            paths,
            dimensions: 0,
            vectors: Vec::new(),
            documents: Vec::new(),
            metadata: None,
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn metadata(&self) -> Option<&IndexMetadata> {
        self.metadata.as_ref()
    }

    /// Embeds the whole corpus and replaces whatever the store held.
    pub fn build(&mut self, corpus: Vec<Document>, embedder: &dyn Embedder) -> Result<(), IndexError> {
        if corpus.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let dimensions = embedder.dimensions();
        let texts = corpus.iter().map(Document::embedding_text).collect::<Vec<_>>();
        let mut vectors = Vec::with_capacity(texts.len() * dimensions);

        for (batch_no, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            let embedded = embedder.embed_batch(batch)?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::CountMismatch {
                    requested: batch.len(),
                    returned: embedded.len(),
                }
                .into());
            }

            for mut vector in embedded {
                if vector.len() != dimensions {
                    return Err(EmbedError::Decode(format!(
                        "expected {dimensions} dimensions, got {}",
                        vector.len()
                    ))
                    .into());
                }
                l2_normalize(&mut vector);
                vectors.extend(vector);
            }

            info!(
                batch = batch_no + 1,
                embedded = batch_no * EMBED_BATCH_SIZE + batch.len(),
                total = texts.len(),
                "embedding batch done"
            );
        }

        self.metadata = Some(IndexMetadata {
            build_date: Utc::now(),
            total_documents: corpus.len(),
            embedding_model: embedder.model_id().to_string(),
        });
        self.dimensions = dimensions;
        self.vectors = vectors;
        self.documents = corpus;

        info!(
            documents = self.documents.len(),
            dimensions, "vector index built"
        );
        Ok(())
    }

    /// Overwrites both persisted files. Only one process may write at a time.
    pub fn save(&self) -> Result<(), IndexError> {
        let metadata = self.metadata.as_ref().ok_or(IndexError::EmptyCorpus)?;
        self.paths.ensure_dir()?;

        fs::write(self.paths.index_path(), self.encode_blob())?;

        let file = DocumentsFileRef {
            documents: &self.documents,
            metadata,
            field_structure: FieldCategory::ALL.iter().map(|c| c.label()).collect(),
        };
        fs::write(
            self.paths.documents_path(),
            serde_json::to_string_pretty(&file)?,
        )?;

        info!(path = %self.paths.root().display(), "index saved");
        Ok(())
    }

    /// Restores the persisted index. Any failure leaves the store empty.
    pub fn load(&mut self) -> bool {
        let index_path = self.paths.index_path();
        let documents_path = self.paths.documents_path();
        if !index_path.exists() || !documents_path.exists() {
            info!(path = %self.paths.root().display(), "no persisted index found");
            return false;
        }

        match self.try_load() {
            Ok(()) => {
                info!(documents = self.documents.len(), "persisted index loaded");
                true
            }
            Err(error) => {
                warn!(%error, "persisted index could not be loaded");
                self.clear();
                false
            }
        }
    }

    fn try_load(&mut self) -> Result<(), IndexError> {
        let blob = fs::read(self.paths.index_path())?;
        let (dimensions, vectors) = decode_blob(&blob)?;

        let raw = fs::read_to_string(self.paths.documents_path())?;
        let file: DocumentsFile = serde_json::from_str(&raw)?;

        let count = if dimensions == 0 { 0 } else { vectors.len() / dimensions };
        if count != file.documents.len() || count != file.metadata.total_documents {
            return Err(IndexError::Corrupt(format!(
                "index holds {count} vectors, documents file holds {} (declared {})",
                file.documents.len(),
                file.metadata.total_documents
            )));
        }

        self.dimensions = dimensions;
        self.vectors = vectors;
        self.documents = file.documents;
        self.metadata = Some(file.metadata);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.dimensions = 0;
        self.vectors.clear();
        self.documents.clear();
        self.metadata = None;
    }

    /// Sorted distinct drug names; product name stands in for a blank one.
    pub fn drug_names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|doc| {
                if doc.drug_name.trim().is_empty() {
                    doc.product_name.clone()
                } else {
                    doc.drug_name.clone()
                }
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredIndex> {
        if !self.is_ready() || k == 0 {
            return Vec::new();
        }
        if query_vector.len() != self.dimensions {
            warn!(
                expected = self.dimensions,
                got = query_vector.len(),
                "query vector has the wrong width"
            );
            return Vec::new();
        }

        let mut query = query_vector.to_vec();
        l2_normalize(&mut query);

        let mut scored = self
            .vectors
            .chunks_exact(self.dimensions)
            .enumerate()
            .map(|(corpus_index, vector)| ScoredIndex {
                score: dot(&query, vector),
                corpus_index,
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        scored
    }

    fn encode_blob(&self) -> Vec<u8> {
        let count = self.documents.len() as u64;
        let mut blob = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4 + CHECKSUM_LEN);
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        blob.extend_from_slice(&(self.dimensions as u32).to_le_bytes());
        blob.extend_from_slice(&count.to_le_bytes());
        for value in &self.vectors {
            blob.extend_from_slice(&value.to_le_bytes());
        }

        let checksum = Sha256::digest(&blob);
        blob.extend_from_slice(&checksum);
        blob
    }
}

fn decode_blob(blob: &[u8]) -> Result<(usize, Vec<f32>), IndexError> {
    if blob.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(IndexError::Corrupt("index blob is truncated".to_string()));
    }

    let (body, checksum) = blob.split_at(blob.len() - CHECKSUM_LEN);
    if Sha256::digest(body).as_slice() != checksum {
        return Err(IndexError::Corrupt("index checksum mismatch".to_string()));
    }
    if &body[0..4] != MAGIC {
        return Err(IndexError::Corrupt("not a medimate index".to_string()));
    }

    let version = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    if version != FORMAT_VERSION {
        return Err(IndexError::Corrupt(format!("unsupported index version {version}")));
    }

    let dimensions = u32::from_le_bytes([body[8], body[9], body[10], body[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&body[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let payload = &body[HEADER_LEN..];
    let expected = count.checked_mul(dimensions).and_then(|n| n.checked_mul(4));
    if expected != Some(payload.len()) {
        return Err(IndexError::Corrupt(format!(
            "index declares {count} x {dimensions} values but holds {} bytes",
            payload.len()
        )));
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok((dimensions, vectors))
}

impl VectorIndex for IndexStore {
    fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredIndex> {
        IndexStore::search(self, query_vector, k)
    }

    fn document(&self, corpus_index: usize) -> Option<&Document> {
        self.documents.get(corpus_index)
    }

    fn is_ready(&self) -> bool {
        self.dimensions > 0 && !self.documents.is_empty()
    }
}
