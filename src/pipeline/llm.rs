//! Model client: send one prompt, get raw text back.
//!
//! [`ModelClient`] owns the credential pool and the per-call timeout; the
//! wire protocol sits behind [`ChatTransport`] so tests can script replies
//! and so Gemini and OpenAI-compatible services share the same rotation and
//! timeout handling.
//!
//! There is deliberately no retry loop here. A failed call surfaces as a
//! [`CallError`]; the orchestrator turns that into an empty batch and the
//! top-up pass makes up the difference.

use crate::config::{GenerationConfig, ProviderKind};
use crate::error::{CallError, ExamError};
use crate::pipeline::credentials::{Credential, CredentialRotator};
use crate::prompts::SYSTEM_PROMPT;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A fully-formed prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    /// A user prompt paired with the default generation system prompt.
    pub fn generation(user: impl Into<String>) -> Self {
        Self {
            system: SYSTEM_PROMPT.to_string(),
            user: user.into(),
        }
    }
}

/// One wire protocol for a chat-style model service.
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Send `prompt` authenticated with `credential`; return the reply text.
    fn send(&self, credential: Credential, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>>;
}

/// Rotating-credential, timeout-bounded client.
pub struct ModelClient {
    rotator: CredentialRotator,
    transport: Arc<dyn ChatTransport>,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(rotator: CredentialRotator, transport: Arc<dyn ChatTransport>, timeout: Duration) -> Self {
        Self {
            rotator,
            transport,
            timeout,
        }
    }

    /// Build the client described by `config`.
    ///
    /// # Errors
    /// [`ExamError::NoCredentials`] when the pool is empty.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, ExamError> {
        let rotator = CredentialRotator::new(config.credentials.iter().cloned())?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ExamError::Internal(format!("HTTP client: {e}")))?;
        let endpoint = config.endpoint().to_string();
        let model = config.model_name().to_string();

        let transport: Arc<dyn ChatTransport> = match config.provider {
            ProviderKind::Gemini => Arc::new(GeminiTransport {
                http,
                endpoint,
                model,
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            }),
            ProviderKind::OpenAiCompatible => Arc::new(OpenAiTransport {
                http,
                endpoint,
                model,
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            }),
        };
        debug!(
            "Model client: {} via {} with {} credential(s), timeout {}s",
            config.model_name(),
            transport.name(),
            rotator.len(),
            config.api_timeout_secs
        );

        Ok(Self::new(
            rotator,
            transport,
            Duration::from_secs(config.api_timeout_secs),
        ))
    }

    pub fn credential_count(&self) -> usize {
        self.rotator.len()
    }

    /// Select a credential now and return the in-flight call.
    ///
    /// The credential is taken before the returned future is first polled,
    /// so dispatching calls in a loop hands out keys in loop order.
    pub fn dispatch(&self, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>> {
        let credential = self.rotator.next_credential().clone();
        let timeout = self.timeout;
        Box::pin(async move {
            debug!("Model call with {:?}", credential);
            match tokio::time::timeout(timeout, self.transport.send(credential, prompt)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout {
                    secs: timeout.as_secs().max(1),
                }),
            }
        })
    }
}

// ── Transports ───────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> CallError {
    CallError::Transport {
        detail: e.to_string(),
    }
}

/// Read a response body, mapping non-success statuses to [`CallError::Status`].
async fn read_success(response: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    Err(CallError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Google Generative Language `models/{model}:generateContent`.
pub struct GeminiTransport {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl ChatTransport for GeminiTransport {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn send(&self, credential: Credential, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>> {
        Box::pin(async move {
            let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
            let body = json!({
                "systemInstruction": { "parts": [{ "text": prompt.system }] },
                "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
                "generationConfig": {
                    "temperature": self.temperature,
                    "maxOutputTokens": self.max_tokens,
                    "responseMimeType": "application/json",
                },
            });

            let response = self
                .http
                .post(&url)
                .header("x-goog-api-key", credential.secret())
                .json(&body)
                .send()
                .await
                .map_err(transport_error)?;
            let parsed: GeminiResponse = read_success(response)
                .await?
                .json()
                .await
                .map_err(transport_error)?;

            let text: String = parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().map(|p| p.text).collect())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(CallError::EmptyResponse);
            }
            Ok(text)
        })
    }
}

/// Any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiTransport {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

impl ChatTransport for OpenAiTransport {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn send(&self, credential: Credential, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.endpoint);
            let body = json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user },
                ],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
            });

            let response = self
                .http
                .post(&url)
                .bearer_auth(credential.secret())
                .json(&body)
                .send()
                .await
                .map_err(transport_error)?;
            let parsed: OpenAiResponse = read_success(response)
                .await?
                .json()
                .await
                .map_err(transport_error)?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|text| !text.trim().is_empty())
                .ok_or(CallError::EmptyResponse)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records which credential each call used and echoes it back.
    struct EchoTransport {
        seen: Mutex<Vec<usize>>,
        delay: Duration,
    }

    impl ChatTransport for EchoTransport {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn send(&self, credential: Credential, prompt: ChatPrompt) -> BoxFuture<'_, Result<String, CallError>> {
            self.seen.lock().unwrap().push(credential.index());
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Ok(format!("{}:{}", credential.secret(), prompt.user))
            })
        }
    }

    fn client(delay: Duration, timeout: Duration) -> (ModelClient, Arc<EchoTransport>) {
        let transport = Arc::new(EchoTransport {
            seen: Mutex::new(Vec::new()),
            delay,
        });
        let client = ModelClient::new(
            CredentialRotator::new(["k0", "k1", "k2"]).unwrap(),
            transport.clone(),
            timeout,
        );
        (client, transport)
    }

    #[tokio::test]
    async fn dispatch_order_decides_rotation() {
        let (client, _) = client(Duration::ZERO, Duration::from_secs(5));
        let calls: Vec<_> = (0..4)
            .map(|i| client.dispatch(ChatPrompt::generation(format!("p{i}"))))
            .collect();
        // Await in reverse: keys were fixed at dispatch, not at completion.
        let mut replies = Vec::new();
        for call in calls.into_iter().rev() {
            replies.push(call.await.unwrap());
        }
        assert_eq!(replies, ["k0:p3", "k2:p2", "k1:p1", "k0:p0"]);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let (client, _) = client(Duration::from_secs(5), Duration::from_millis(20));
        let err = client
            .dispatch(ChatPrompt::generation("slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
    }

    #[test]
    fn from_config_requires_credentials() {
        let config = GenerationConfig::default();
        assert!(matches!(
            ModelClient::from_config(&config),
            Err(ExamError::NoCredentials)
        ));
    }

    #[test]
    fn from_config_builds_each_provider() {
        for provider in [ProviderKind::Gemini, ProviderKind::OpenAiCompatible] {
            let config = GenerationConfig::builder()
                .credentials(["a", "b"])
                .provider(provider)
                .build()
                .unwrap();
            let client = ModelClient::from_config(&config).unwrap();
            assert_eq!(client.credential_count(), 2);
        }
    }

    #[test]
    fn gemini_response_shape() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"[1,"},{"text":"2]"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "[1,2]");
    }
}
