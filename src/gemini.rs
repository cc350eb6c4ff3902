//! [`GenerationClient`] backed by the Gemini `generateContent` endpoint.

use crate::{
    error::{Error, Result},
    oracle::{format_request, parse_response, Candidates, GenerationClient},
    prompt::{EXAMPLE_REQUEST, EXAMPLE_RESPONSE, SYSTEM_INSTRUCTION},
};
use reqwest::{blocking::Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-exp-0827";

/// Default API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Upper bound on reply length
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
        }
    }
}

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GeminiConfig {
    /// Model name, e.g. `gemini-1.5-flash`
    pub model: String,

    /// API key sent in the `x-goog-api-key` header
    pub api_key: String,

    /// API base URL without trailing slash
    pub endpoint: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Sampling parameters
    pub params: GenerationParams,
}

impl GeminiConfig {
    /// Creates a configuration with default model and endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            params: GenerationParams::default(),
        }
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key, model or endpoint is empty, or the
    /// timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config(
                "Gemini API key is missing. Set GEMINI_API_KEY or pass --api-key",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::config("model must not be empty"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::config("endpoint must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than 0"));
        }
        Ok(())
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Stateless Gemini client.
///
/// Instructions, worked example and sampling parameters are fixed at
/// construction. Each [`generate`](GenerationClient::generate) call sends a
/// self-contained request, so nothing learned in one call leaks into the next.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: HttpClient,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Creates a client from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        config.validate()?;

        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn request_body<'a>(&'a self, input: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: SYSTEM_INSTRUCTION,
                }],
            },
            contents: vec![
                Content::turn("user", EXAMPLE_REQUEST),
                Content::turn("model", EXAMPLE_RESPONSE),
                Content::turn("user", input),
            ],
            generation_config: GenerationConfig {
                params: self.config.params,
                response_mime_type: "text/plain",
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

impl GenerationClient for GeminiClient {
    fn generate(&self, words: &[String]) -> Result<Candidates> {
        let input = format_request(words);
        let body = self.request_body(&input);

        debug!("Sending {} words to {}", words.len(), self.config.model);

        let response = self
            .http
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .map_or_else(|_| "unknown error".to_string(), |body| body.error.message);
            let message = format!("generateContent failed ({status}): {message}");

            return Err(if is_rejected_request(status) {
                Error::config(message)
            } else {
                Error::oracle(message)
            });
        }

        let body: GenerateResponse = response.json()?;
        let text = body.into_text()?;
        parse_response(&text)
    }
}

/// Statuses caused by the key or model settings. Retrying cannot clear them.
fn is_rejected_request(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::NOT_FOUND
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

impl<'a> Content<'a> {
    fn turn(role: &'a str, text: &'a str) -> Self {
        Self {
            role: Some(role),
            parts: vec![Part { text }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(flatten)]
    params: GenerationParams,
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct SafetySetting<'a> {
    category: &'a str,
    threshold: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Result<String> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::oracle("response contained no candidates"))?;

        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            return Err(Error::oracle(format!(
                "response contained no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchPipeline, Config, WordSource};
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    fn client() -> GeminiClient {
        GeminiClient::new(GeminiConfig::new("test-key")).unwrap()
    }

    /// Serves a single canned HTTP response and returns the request head.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1beta", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            head
        });

        (endpoint, handle)
    }

    fn local_client(endpoint: &str) -> GeminiClient {
        GeminiClient::new(
            GeminiConfig::new("test-key")
                .endpoint(endpoint)
                .model("gemini-test")
                .timeout(Duration::from_secs(10)),
        )
        .unwrap()
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn test_missing_api_key() {
        let err = GeminiClient::new(GeminiConfig::new("  ")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_zero_timeout() {
        let config = GeminiConfig::new("key").timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_url() {
        let config = GeminiConfig::new("key")
            .endpoint("http://localhost:8080/v1beta/")
            .model("gemini-1.5-flash");
        assert_eq!(
            config.url(),
            "http://localhost:8080/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let client = client();
        let body = serde_json::to_value(client.request_body("apple\nbanana")).unwrap();

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "apple\nbanana");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["generationConfig"]["topK"], 64);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["generationConfig"]["responseMimeType"], "text/plain");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(body["safetySettings"][0]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn test_request_body_is_independent_of_previous_calls() {
        let client = client();
        let first = serde_json::to_value(client.request_body("apple")).unwrap();
        let _ = serde_json::to_value(client.request_body("banana")).unwrap();
        let again = serde_json::to_value(client.request_body("apple")).unwrap();

        assert_eq!(first, again);
    }

    #[test]
    fn test_response_text_extraction() {
        let json = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "apple,アップル\n"}, {"text": "banana,バナナ"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.into_text().unwrap(), "apple,アップル\nbanana,バナナ");
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#).unwrap();
        assert!(response.into_text().unwrap_err().is_oracle());
    }

    #[test]
    fn test_response_without_text() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();

        let err = response.into_text().unwrap_err();
        assert!(err.is_oracle());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_generate_parses_reply() {
        let (endpoint, server) = serve_once(
            "200 OK",
            r#"{"candidates": [{"content": {"parts": [{"text": "apple,アップル\nbanana,バ ナ ナ"}]}}]}"#,
        );

        let answer = local_client(&endpoint)
            .generate(&words(&["apple", "banana"]))
            .unwrap();

        assert_eq!(answer["apple"], "アップル");
        assert_eq!(answer["banana"], "バナナ");

        let head = server.join().unwrap();
        assert!(head.starts_with("POST /v1beta/models/gemini-test:generateContent "));
        assert!(head.to_lowercase().contains("x-goog-api-key: test-key"));
        assert!(!head.contains("key=test-key"));
    }

    #[test]
    fn test_generate_bad_key_is_config_error() {
        let (endpoint, server) = serve_once(
            "401 Unauthorized",
            r#"{"error": {"code": 401, "message": "API key not valid"}}"#,
        );

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_config());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_generate_unknown_model_is_config_error() {
        let (endpoint, server) = serve_once(
            "404 Not Found",
            r#"{"error": {"code": 404, "message": "models/gemini-test is not found"}}"#,
        );

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_config());
    }

    #[test]
    fn test_generate_unavailable_is_oracle_error() {
        let (endpoint, server) = serve_once(
            "503 Service Unavailable",
            r#"{"error": {"code": 503, "message": "The model is overloaded"}}"#,
        );

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_oracle());
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn test_generate_rate_limited_is_oracle_error() {
        let (endpoint, server) = serve_once("429 Too Many Requests", "slow down");

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_oracle());
        assert!(err.to_string().contains("unknown error"));
    }

    #[test]
    fn test_generate_undecodable_body_is_oracle_error() {
        let (endpoint, server) = serve_once("200 OK", "<html>gateway</html>");

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_oracle());
    }

    #[test]
    fn test_generate_connection_refused_is_oracle_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1beta", listener.local_addr().unwrap());
        drop(listener);

        let err = local_client(&endpoint)
            .generate(&words(&["apple"]))
            .unwrap_err();

        assert!(err.is_oracle());
    }

    #[test]
    fn test_bad_key_aborts_run() {
        let temp = assert_fs::TempDir::new().unwrap();
        let map = temp.path().join("katakana_map.json");
        let (endpoint, server) = serve_once(
            "401 Unauthorized",
            r#"{"error": {"code": 401, "message": "API key not valid"}}"#,
        );

        let config = Config::builder()
            .map_path(&map)
            .chunk_size(1)
            .max_attempts(3)
            .retry_delay(Duration::ZERO)
            .build()
            .unwrap();
        let result = BatchPipeline::new(config, local_client(&endpoint))
            .unwrap()
            .run(&WordSource::from_words(["judo", "aaa", "aalen"]));
        server.join().unwrap();

        assert!(result.unwrap_err().is_config());
        assert!(!map.exists());
    }
}
