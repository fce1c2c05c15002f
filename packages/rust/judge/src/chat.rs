//! OpenAI-compatible chat-completions judge.
//!
//! Works against any endpoint that speaks `POST /chat/completions`
//! (Ollama, vLLM, llama.cpp server, hosted APIs).

use std::time::Duration;

use async_trait::async_trait;
use curricula_shared::{CurriculaError, Result};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::{ConceptRecord, JudgeError, ProposedCluster, SimilarityJudge, parse_clusters};

/// User-Agent string for judge requests.
const USER_AGENT: &str = concat!("curricula/", env!("CARGO_PKG_VERSION"));

/// Upper bound on how much of an error body is kept.
const MAX_ERROR_BODY: usize = 500;

const SYSTEM_PROMPT: &str = "You are a technical taxonomist for engineering training material. \
You are given a numbered list of concepts, each with a name and description. \
Group concepts that are exact synonyms, abbreviations, or trivial variations of the same idea \
(for example \"E-Stop\", \"Emergency Stop\" and \"Emergency Halt\"). \
Do not group concepts that are merely related. \
For every group of two or more concepts, choose the clearest canonical name and write a one-sentence description. \
Respond with JSON only, in the form \
{\"clusters\": [{\"canonical_name\": \"...\", \"description\": \"...\", \"members\": [1, 2]}]} \
where members are the numbers from the list. Concepts with no synonym must be left out.";

/// Connection settings for [`ChatJudge`].
#[derive(Debug, Clone)]
pub struct ChatJudgeOptions {
    /// Base URL of the API, e.g. `http://localhost:11434/v1`.
    pub base_url: String,
    pub model: String,
    /// Bearer token, if the endpoint requires one.
    pub api_key: Option<String>,
    pub temperature: f32,
    /// Transport-level timeout for one request.
    pub timeout: Duration,
}

/// Judge backed by a chat-completions endpoint.
pub struct ChatJudge {
    client: Client,
    endpoint: Url,
    opts: ChatJudgeOptions,
}

impl ChatJudge {
    pub fn new(opts: ChatJudgeOptions) -> Result<Self> {
        let base = opts.base_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/chat/completions")).map_err(|e| {
            CurriculaError::config(format!("invalid judge base_url '{}': {e}", opts.base_url))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(opts.timeout)
            .build()
            .map_err(|e| CurriculaError::Judge(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            opts,
        })
    }

    fn request_body(&self, batch: &[ConceptRecord]) -> Value {
        json!({
            "model": self.opts.model,
            "temperature": self.opts.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": render_batch(batch) },
            ],
        })
    }
}

/// Render a batch as a numbered list; numbers are the handles the model answers with.
fn render_batch(batch: &[ConceptRecord]) -> String {
    let mut out = String::from("Concepts:\n");
    for (i, c) in batch.iter().enumerate() {
        if c.description.trim().is_empty() {
            out.push_str(&format!("{}. {}\n", i + 1, c.name));
        } else {
            out.push_str(&format!("{}. {}: {}\n", i + 1, c.name, c.description.trim()));
        }
    }
    out
}

fn map_transport(e: reqwest::Error, timeout: Duration) -> JudgeError {
    if e.is_timeout() {
        JudgeError::Timeout(timeout)
    } else {
        JudgeError::Transport(e.to_string())
    }
}

#[async_trait]
impl SimilarityJudge for ChatJudge {
    #[instrument(skip_all, fields(model = %self.opts.model, batch = batch.len()))]
    async fn judge(
        &self,
        batch: &[ConceptRecord],
    ) -> std::result::Result<Vec<ProposedCluster>, JudgeError> {
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request_body(batch));
        if let Some(key) = &self.opts.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| map_transport(e, self.opts.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(JudgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(self.opts.timeout)
                } else {
                    JudgeError::Unparseable(format!("response is not JSON: {e}"))
                }
            })?;

        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                JudgeError::Unparseable("response has no choices[0].message.content".into())
            })?;

        debug!(chars = content.len(), "judge responded");
        parse_clusters(content, batch)
    }

    fn model(&self) -> &str {
        &self.opts.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_shared::ConceptId;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn opts(base: &str) -> ChatJudgeOptions {
        ChatJudgeOptions {
            base_url: format!("{base}/v1"),
            model: "test-model".into(),
            api_key: None,
            temperature: 0.0,
            timeout: Duration::from_secs(5),
        }
    }

    fn batch() -> Vec<ConceptRecord> {
        vec![
            ConceptRecord {
                id: ConceptId("a".into()),
                name: "E-Stop".into(),
                description: "Stops the machine".into(),
            },
            ConceptRecord {
                id: ConceptId("b".into()),
                name: "Emergency Stop".into(),
                description: String::new(),
            },
        ]
    }

    fn completion(content: &str) -> Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[test]
    fn renders_numbered_batch() {
        let text = render_batch(&batch());
        assert!(text.contains("1. E-Stop: Stops the machine\n"));
        assert!(text.contains("2. Emergency Stop\n"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let mut o = opts("http://localhost");
        o.base_url = "not a url".into();
        assert!(ChatJudge::new(o).is_err());
    }

    #[tokio::test]
    async fn judge_parses_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({ "model": "test-model" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"clusters":[{"canonical_name":"Emergency Stop","description":"d","members":[1,2]}]}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let judge = ChatJudge::new(opts(&server.uri())).unwrap();
        let clusters = judge.judge(&batch()).await.expect("judge");
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            clusters[0].member_ids,
            vec![ConceptId("a".into()), ConceptId("b".into())]
        );
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(r#"{"clusters":[]}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut o = opts(&server.uri());
        o.api_key = Some("secret".into());
        let judge = ChatJudge::new(o).unwrap();
        assert!(judge.judge(&batch()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let judge = ChatJudge::new(opts(&server.uri())).unwrap();
        let err = judge.judge(&batch()).await.unwrap_err();
        assert_eq!(
            err,
            JudgeError::Status {
                status: 503,
                body: "overloaded".into()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn prose_answer_is_unparseable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("They look unrelated to me.")),
            )
            .mount(&server)
            .await;

        let judge = ChatJudge::new(opts(&server.uri())).unwrap();
        let err = judge.judge(&batch()).await.unwrap_err();
        assert!(matches!(err, JudgeError::Unparseable(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(r#"{"clusters":[]}"#))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let mut o = opts(&server.uri());
        o.timeout = Duration::from_millis(200);
        let judge = ChatJudge::new(o).unwrap();
        let err = judge.judge(&batch()).await.unwrap_err();
        assert!(matches!(err, JudgeError::Timeout(_)));
    }
}
