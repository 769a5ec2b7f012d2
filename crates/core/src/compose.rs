use crate::context::{render_context, sources, SourceInfo};
use crate::error::ComposeError;
use crate::models::RetrievalResult;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::time::Duration;
use tracing::warn;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const NOT_FOUND_RESPONSE: &str =
    "관련된 의료 정보를 찾을 수 없습니다. 다른 약물명이나 질문으로 시도해보세요.";
pub const ERROR_RESPONSE: &str =
    "죄송합니다. AI 응답 생성 중 오류가 발생했습니다. 검색된 정보를 확인해주세요.";
pub const DISCLAIMER: &str = "⚠️ 이 정보는 의료진 상담을 대체할 수 없습니다.";

const SYSTEM_PROMPT: &str = "당신은 약학 정보를 안내하는 도우미입니다. 다음 규칙을 지켜 답변하세요.
1. 제공된 참고 문서의 내용에만 근거해 답변합니다.
2. 약국에서 쉽게 구할 수 있는 일반의약품을 우선 안내합니다.
3. 약물명으로 질문하면 효능, 용법, 주의사항, 부작용, 보관법 순으로 정리합니다.
4. 증상으로 질문하면 증상을 요약하고 추천 약물과 그 효능, 상세 정보를 정리합니다.
5. 추천할 약물을 문서에서 찾을 수 없으면 찾을 수 없다고 답합니다.
6. 의학 정보에는 출처를 밝히고 중복은 제거합니다.
7. 뇌졸중, 심근경색 등 응급이 의심되면 즉시 119 연락과 병원 방문을 권합니다.
8. 진단이나 처방은 하지 않습니다.
9. 모든 답변 끝에 \"⚠️ 이 정보는 의료진 상담을 대체할 수 없습니다.\"를 붙입니다.";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(alias = "prompt_tokens")]
    pub prompt_tokens: u32,
    #[serde(alias = "completion_tokens")]
    pub completion_tokens: u32,
    #[serde(alias = "total_tokens")]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SourceInfo>,
    pub model_used: String,
    pub usage: Option<TokenUsage>,
    pub error: Option<String>,
}

/// Language-model boundary: turns a question plus rendered context into text.
pub trait AnswerComposer {
    fn model_id(&self) -> &str;

    fn complete(&self, query: &str, context: &str) -> Result<Completion, ComposeError>;
}

impl<T: AnswerComposer + ?Sized> AnswerComposer for &T {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn complete(&self, query: &str, context: &str) -> Result<Completion, ComposeError> {
        (**self).complete(query, context)
    }
}

pub fn compose_answer(
    composer: &dyn AnswerComposer,
    query: &str,
    results: &[RetrievalResult],
) -> Answer {
    if results.is_empty() {
        return Answer {
            response: NOT_FOUND_RESPONSE.to_string(),
            sources: Vec::new(),
            model_used: "no_results".to_string(),
            usage: None,
            error: None,
        };
    }

    let context = render_context(results);
    let sources = sources(results);

    match composer.complete(query, &context) {
        Ok(completion) => Answer {
            response: completion.content,
            sources,
            model_used: composer.model_id().to_string(),
            usage: completion.usage,
            error: None,
        },
        Err(error) => {
            warn!(%error, model = composer.model_id(), "answer composition failed");
            Answer {
                response: ERROR_RESPONSE.to_string(),
                sources,
                model_used: "error".to_string(),
                usage: None,
                error: Some(error.to_string()),
            }
        }
    }
}

pub fn user_prompt(query: &str, context: &str) -> String {
    format!(
        "질문: {query}\n\n참고 문서:\n{context}\n\n위 문서들을 바탕으로 정확하고 안전한 답변을 제공해줘."
    )
}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsComposer {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsComposer {
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>) -> Result<Self, ComposeError> {
        if api_key.trim().is_empty() {
            return Err(ComposeError::BackendResponse {
                backend: base_url.to_string(),
                details: "missing API key".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|error| {
            ComposeError::BackendResponse {
                backend: base_url.to_string(),
                details: format!("invalid API key header: {error}"),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .default_headers(headers)
                .build()?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 800,
        })
    }

    pub fn openai(api_key: &str) -> Result<Self, ComposeError> {
        Self::new(api_key, OPENAI_BASE_URL, DEFAULT_CHAT_MODEL)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

impl AnswerComposer for ChatCompletionsComposer {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn complete(&self, query: &str, context: &str) -> Result<Completion, ComposeError> {
        let prompt = user_prompt(query, context);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self.client.post(&self.endpoint).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ComposeError::BackendResponse {
                backend: self.endpoint.clone(),
                details: format!("{status}: {body}"),
            });
        }

        let body = response.text()?;
        parse_completion(&body, &self.endpoint)
    }
}

fn parse_completion(body: &str, backend: &str) -> Result<Completion, ComposeError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|error| ComposeError::BackendResponse {
            backend: backend.to_string(),
            details: error.to_string(),
        })?;

    let content = parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ComposeError::EmptyResponse)?;

    Ok(Completion {
        content,
        usage: parsed.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DrugFields, ResultOrigin};
    use std::cell::RefCell;

    struct FakeComposer {
        reply: Option<&'static str>,
        seen_context: RefCell<Option<String>>,
    }

    impl AnswerComposer for FakeComposer {
        fn model_id(&self) -> &str {
            "fake-model"
        }

        fn complete(&self, _query: &str, context: &str) -> Result<Completion, ComposeError> {
            *self.seen_context.borrow_mut() = Some(context.to_string());
            match self.reply {
                Some(reply) => Ok(Completion {
                    content: reply.to_string(),
                    usage: None,
                }),
                None => Err(ComposeError::EmptyResponse),
            }
        }
    }

    fn composer(reply: Option<&'static str>) -> FakeComposer {
        FakeComposer {
            reply,
            seen_context: RefCell::new(None),
        }
    }

    fn result() -> RetrievalResult {
        RetrievalResult {
            document: Document {
                drug_name: "타이레놀정".to_string(),
                product_name: "타이레놀정".to_string(),
                company_name: "한국얀센".to_string(),
                ingredient_name: None,
                source: "식약처 의약품개요정보 - 타이레놀정".to_string(),
                url: String::new(),
                category: "해열·진통".to_string(),
                fields: DrugFields {
                    efficacy: Some("두통, 발열".to_string()),
                    ..Default::default()
                },
            },
            similarity_score: 0.82,
            rank: 1,
            origin: ResultOrigin::Vector,
        }
    }

    #[test]
    fn empty_results_never_reach_the_model() {
        let fake = composer(Some("unused"));
        let answer = compose_answer(&fake, "두통약", &[]);

        assert_eq!(answer.response, NOT_FOUND_RESPONSE);
        assert_eq!(answer.model_used, "no_results");
        assert!(fake.seen_context.borrow().is_none());
    }

    #[test]
    fn successful_completion_carries_sources() {
        let fake = composer(Some("💊 검색 약물 : 타이레놀정"));
        let answer = compose_answer(&fake, "타이레놀", &[result()]);

        assert_eq!(answer.response, "💊 검색 약물 : 타이레놀정");
        assert_eq!(answer.model_used, "fake-model");
        assert_eq!(answer.sources.len(), 1);
        assert!(fake
            .seen_context
            .borrow()
            .as_deref()
            .is_some_and(|context| context.contains("[문서 1] 효과: 두통, 발열")));
    }

    #[test]
    fn composer_failure_returns_apology_with_sources() {
        let answer = compose_answer(&composer(None), "타이레놀", &[result()]);

        assert_eq!(answer.response, ERROR_RESPONSE);
        assert_eq!(answer.model_used, "error");
        assert_eq!(answer.sources.len(), 1);
        assert!(answer.error.is_some());
    }

    #[test]
    fn completion_body_is_parsed_with_usage() -> Result<(), ComposeError> {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "답변"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion = parse_completion(body, "test")?;

        assert_eq!(completion.content, "답변");
        assert_eq!(completion.usage.map(|usage| usage.total_tokens), Some(15));
        Ok(())
    }

    #[test]
    fn blank_completion_is_an_empty_response() {
        let body = r#"{"choices": [{"message": {"content": "  "}}]}"#;
        assert!(matches!(
            parse_completion(body, "test"),
            Err(ComposeError::EmptyResponse)
        ));
    }

    #[test]
    fn prompt_embeds_question_and_context() {
        let prompt = user_prompt("두통약", "\n[문서 1] 효과: 두통\n");
        assert!(prompt.starts_with("질문: 두통약"));
        assert!(prompt.contains("참고 문서:\n\n[문서 1]"));
    }
}
