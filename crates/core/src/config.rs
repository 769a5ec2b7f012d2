use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGISTRY_URL: &str =
    "http://apis.data.go.kr/1471000/DrbEasyDrugInfoService/getDrbEasyDrugList";
pub const DEFAULT_TARGET_DOCUMENTS: usize = 5_000;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub page_size: u32,
    pub target_documents: usize,
    pub max_pages: u32,
    /// Pause between registry page requests, and after a failed page.
    pub page_delay: Duration,
}

impl CollectorOptions {
    pub fn for_target(target_documents: usize) -> Self {
        Self {
            page_size: 100,
            target_documents,
            max_pages: default_max_pages(target_documents),
            page_delay: Duration::from_millis(500),
        }
    }
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self::for_target(DEFAULT_TARGET_DOCUMENTS)
    }
}

/// Page cap scaled to the target, never below 100 pages.
pub fn default_max_pages(target_documents: usize) -> u32 {
    let scaled = (target_documents / 100 + 10).min(u32::MAX as usize) as u32;
    scaled.max(100)
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Any vector hit scoring below this triggers the live registry search.
    pub similarity_threshold: f32,
    pub min_vector_results: usize,
    pub max_results: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.7,
            min_vector_results: 2,
            max_results: 3,
        }
    }
}

/// File layout of the persisted state under one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join("medical_docs.index")
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.json")
    }

    pub fn progress_path(&self) -> PathBuf {
        self.data_dir.join("build_progress.json")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("collected_pages.jsonl")
    }

    pub fn root(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new("./data")
    }
}
