pub mod assembler;
pub mod collector;
pub mod compose;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod rerank;
pub mod safety;
pub mod traits;

pub use assembler::{nedrug_search_url, DocumentAssembler, REGISTRY_SOURCE};
pub use collector::{dedup_corpus, Collector, LiveRegistrySearch};
pub use compose::{
    compose_answer, Answer, AnswerComposer, ChatCompletionsComposer, Completion, TokenUsage,
    DISCLAIMER,
};
pub use config::{CollectorOptions, DataPaths, RetrievalOptions, DEFAULT_REGISTRY_URL};
pub use context::{render_context, sources, SourceInfo};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ComposeError, EmbedError, IndexError, IngestError, RegistryError};
pub use extractor::{FieldExtractor, DEFAULT_CATEGORY};
pub use index::{IndexMetadata, IndexStore};
pub use models::{
    Document, DrugFields, FieldCategory, RawRecord, ResultOrigin, RetrievalResult, ScoredIndex,
};
pub use normalizer::{is_valid_content, TextCleaner};
pub use orchestrator::{HybridRetriever, RetrievalOutcome};
pub use progress::{IngestionProgress, PageJournal, ProgressStore};
pub use registry::{KfdaRegistry, RegistryClient, RegistryQuery, RegistryResponse};
pub use rerank::SimilarityReranker;
pub use safety::{check_emergency_keywords, SafetyWarning};
pub use traits::{LiveSource, VectorIndex};
