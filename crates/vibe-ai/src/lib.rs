//! AI text-generation client (spec §4.4, "AI-generated prose").
//!
//! The workflow engine consumes this purely as an opaque `string -> string`
//! function: a diff and a tentative title go in, prose for the PR body's
//! `Description` section comes out. The provider behind that function (its
//! prompt design, model choice, cost controls) is an external collaborator;
//! this crate only owns getting a prompt there and a completion back.

use std::time::Duration;

use serde::Deserialize;
use vibe_retry::RetryExecutor;
use vibe_types::{NotFoundKind, VibeError};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const USER_AGENT: &str = concat!("vibe/", env!("CARGO_PKG_VERSION"));

/// The contract `CommandContext` depends on. Kept to a single method so
/// the workflow engine never has to know which provider is configured.
pub trait AiClient {
    fn generate(&self, prompt: &str) -> Result<String, VibeError>;
}

pub struct ClaudeClient {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::blocking::Client,
    retry: RetryExecutor,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(DEFAULT_BASE_URL, api_key, DEFAULT_MODEL, DEFAULT_MAX_TOKENS)
    }

    pub fn with_config(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            client,
            retry: RetryExecutor::from_policy(vibe_retry::RetryPolicy::Default),
        }
    }
}

impl AiClient for ClaudeClient {
    fn generate(&self, prompt: &str) -> Result<String, VibeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![MessageRequest {
                role: "user",
                content: prompt,
            }],
        };

        let response = self.retry.run_vibe(|_attempt| {
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .map_err(|e| classify_transport_error(&e))
        })?;

        handle_status(&response)?;

        let wire: MessagesResponse = response.json().map_err(|e| VibeError::Other(e.into()))?;
        Ok(wire
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

fn classify_transport_error(e: &reqwest::Error) -> VibeError {
    if e.is_timeout() || e.is_connect() {
        VibeError::transient("ai request", e.to_string())
    } else {
        VibeError::Other(anyhow::anyhow!(e.to_string()))
    }
}

fn handle_status(response: &reqwest::blocking::Response) -> Result<(), VibeError> {
    match response.status() {
        reqwest::StatusCode::OK => Ok(()),
        reqwest::StatusCode::NOT_FOUND => Err(VibeError::not_found(NotFoundKind::Other, "model or endpoint")),
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(VibeError::Authentication {
            service: "claude".to_string(),
            token_source: "claude.api_key".to_string(),
        }),
        status if status.as_u16() == 429 || status.is_server_error() => {
            Err(VibeError::transient("ai request", status.to_string()))
        }
        status => Err(VibeError::Other(anyhow::anyhow!("unexpected ai response: {status}"))),
    }
}

#[derive(Debug, serde::Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageRequest<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct MessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn spawn_mock(status: u16, body: &'static str) -> (String, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {status} OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn generate_concatenates_text_blocks() {
        let body = r#"{"content":[{"type":"text","text":"Adds retry logic "},{"type":"text","text":"to the hosting client."}]}"#;
        let (url, handle) = spawn_mock(200, body);
        let client = ClaudeClient::with_config(url, "test-key", "claude-3-5-sonnet-20241022", 256);

        let text = client.generate("Summarize this diff").unwrap();
        assert_eq!(text, "Adds retry logic to the hosting client.");
        handle.join().unwrap();
    }

    #[test]
    fn generate_unauthorized_maps_to_authentication_error() {
        let (url, handle) = spawn_mock(401, "{}");
        let client = ClaudeClient::with_config(url, "bad-key", "claude-3-5-sonnet-20241022", 256);

        let err = client.generate("prompt").unwrap_err();
        assert!(matches!(err, VibeError::Authentication { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn generate_ignores_non_text_blocks() {
        let body = r#"{"content":[{"type":"tool_use"},{"type":"text","text":"ok"}]}"#;
        let (url, handle) = spawn_mock(200, body);
        let client = ClaudeClient::with_config(url, "test-key", "claude-3-5-sonnet-20241022", 256);

        let text = client.generate("prompt").unwrap();
        assert_eq!(text, "ok");
        handle.join().unwrap();
    }
}
