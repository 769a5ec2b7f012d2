use crate::error::EmbedError;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const UPSTAGE_BASE_URL: &str = "https://api.upstage.ai/v1";
pub const UPSTAGE_PASSAGE_MODEL: &str = "solar-embedding-1-large-passage";
pub const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns text into vectors. Every vector an embedder returns has
/// `dimensions()` entries; callers normalize before comparing.
pub trait Embedder {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        if vectors.len() != 1 {
            return Err(EmbedError::CountMismatch {
                requested: 1,
                returned: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Scales `vector` to unit length in place. Zero vectors are left alone.
pub fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Cosine similarity; zero when either side has no magnitude.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let left_norm = dot(left, left).sqrt();
    let right_norm = dot(right, right).sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot(left, right) / (left_norm * right_norm)
}

/// Offline embedder hashing character bigrams and trigrams into buckets.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("char-ngram-{dimensions}"),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let padded = format!(" {} ", text.trim().to_lowercase());
        let chars: Vec<char> = padded.chars().collect();

        if chars.len() <= 2 {
            return vector;
        }

        for width in [2, 3] {
            for window in chars.windows(width) {
                let bucket = (fnv1a(window) % self.dimensions as u64) as usize;
                vector[bucket] += 1.0;
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

fn fnv1a(window: &[char]) -> u64 {
    let mut hash = 1469598103934665603u64;
    let mut buf = [0u8; 4];
    for ch in window {
        for byte in ch.encode_utf8(&mut buf).bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
    }
    hash
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// `dimensions` is what the model returns; it is checked on every response.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, EmbedError> {
        let model = model.into();
        if api_key.trim().is_empty() {
            return Err(EmbedError::BackendResponse {
                backend: base_url.to_string(),
                details: "missing API key".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|error| {
            EmbedError::BackendResponse {
                backend: base_url.to_string(),
                details: format!("invalid API key header: {error}"),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(EMBEDDING_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }

    pub fn upstage(api_key: &str, dimensions: usize) -> Result<Self, EmbedError> {
        Self::new(api_key, UPSTAGE_BASE_URL, UPSTAGE_PASSAGE_MODEL, dimensions)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    index: usize,
    embedding: Vec<f32>,
}

impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::BackendResponse {
                backend: self.endpoint.clone(),
                details: format!("{status}: {body}"),
            });
        }

        let body = response.text()?;
        decode_embeddings(&body, texts.len(), self.dimensions)
    }
}

fn decode_embeddings(
    body: &str,
    requested: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(body).map_err(|error| EmbedError::Decode(error.to_string()))?;
    parsed.data.sort_by_key(|entry| entry.index);

    if parsed.data.len() != requested {
        return Err(EmbedError::CountMismatch {
            requested,
            returned: parsed.data.len(),
        });
    }

    if let Some(entry) = parsed
        .data
        .iter()
        .find(|entry| entry.embedding.len() != dimensions)
    {
        return Err(EmbedError::Decode(format!(
            "expected {dimensions} dimensions, got {}",
            entry.embedding.len()
        )));
    }

    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}
