//! Chat-completion gateway for multimodal analysis calls.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format with typed
//! content parts (text, base64 image data URI, base64 audio data URI).
//! One call per request: the gateway itself never retries.

use crate::config::{is_placeholder_key, GatewayConfig};
use crate::error::{truncate_detail, GatewayError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Anything that can answer a chat-completion request with reply text.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send(&self, request: GatewayRequest) -> Result<String, GatewayError>;
}

/// Ordered content parts for one user message.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Label used in logs, e.g. the prompt mode.
    pub operation: String,
    pub parts: Vec<ContentPart>,
}

impl GatewayRequest {
    /// Text-only request.
    pub fn text(operation: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parts: vec![ContentPart::text(prompt)],
        }
    }

    fn media_bytes(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { .. } => 0,
                ContentPart::ImageUrl { image_url } => image_url.url.len(),
                ContentPart::InputAudio { input_audio } => input_audio.data.len(),
            })
            .sum()
    }
}

/// Raw HTTP outcome before classification.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub status: u16,
    pub body: String,
}

impl GatewayReply {
    /// Map the reply onto reply text or the error taxonomy.
    /// Only 200 counts as success.
    pub fn classify(self) -> Result<String, GatewayError> {
        match self.status {
            200 => {
                let response: ChatCompletionResponse = serde_json::from_str(&self.body)
                    .map_err(|e| GatewayError::Decode(e.to_string()))?;
                Ok(response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default())
            }
            401 => Err(GatewayError::Unauthorized(truncate_detail(&self.body))),
            402 => Err(GatewayError::PaymentRequired(truncate_detail(&self.body))),
            status => Err(GatewayError::Transport {
                status,
                detail: truncate_detail(&self.body),
            }),
        }
    }
}

/// HTTP client for the configured chat-completion endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    config: GatewayConfig,
}

impl ChatClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Credential checks happen per call so a missing key surfaces as a document status.
    fn api_key(&self) -> Result<&str, GatewayError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(GatewayError::MissingCredential)?;
        if is_placeholder_key(key) {
            return Err(GatewayError::InvalidCredential);
        }
        Ok(key)
    }
}

#[async_trait]
impl ChatGateway for ChatClient {
    async fn send(&self, request: GatewayRequest) -> Result<String, GatewayError> {
        let api_key = self.api_key()?;

        info!(
            "Chat call start: {}, model={}, parts={}, media_bytes={}",
            request.operation,
            self.config.model,
            request.parts.len(),
            request.media_bytes()
        );

        let operation = request.operation;
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: Role::User,
                content: request.parts,
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        info!(
            "Chat call returned: {}, status={}, bytes={}",
            operation,
            status.as_u16(),
            text.len()
        );
        if status != StatusCode::OK {
            warn!(
                "Chat error preview ({}): {}",
                operation,
                truncate_detail(&text)
            );
        }

        let reply = GatewayReply {
            status: status.as_u16(),
            body: text,
        }
        .classify()?;
        debug!(
            "Chat reply preview ({}): {}",
            operation,
            reply.chars().take(200).collect::<String>()
        );
        Ok(reply)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: Role,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One typed part of a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    InputAudio { input_audio: InputAudio },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudio {
    /// `data:audio/{format};base64,...`
    pub data: String,
    pub format: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image part as a base64 data URI, MIME type sniffed from magic bytes.
    pub fn image(data: &[u8]) -> Self {
        let url = format!("data:{};base64,{}", image_mime(data), BASE64.encode(data));
        Self::ImageUrl {
            image_url: ImageUrl { url },
        }
    }

    pub fn audio(data: &[u8], format: &str) -> Self {
        Self::InputAudio {
            input_audio: InputAudio {
                data: format!("data:audio/{};base64,{}", format, BASE64.encode(data)),
                format: format.to_string(),
            },
        }
    }
}

/// Sniff an image MIME type, defaulting to JPEG (what camera captures produce).
fn image_mime(data: &[u8]) -> &'static str {
    use image::ImageFormat;
    match image::guess_format(data) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn client_for(server: &MockServer) -> ChatClient {
        let config = GatewayConfig::default()
            .with_base_url(server.uri())
            .with_api_key("test-key");
        ChatClient::new(config).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn test_content_part_wire_shapes() {
        let text = serde_json::to_value(ContentPart::text("hi")).unwrap();
        assert_eq!(text, json!({"type": "text", "text": "hi"}));

        let audio = serde_json::to_value(ContentPart::audio(b"abc", "m4a")).unwrap();
        assert_eq!(
            audio,
            json!({
                "type": "input_audio",
                "input_audio": {"data": "data:audio/m4a;base64,YWJj", "format": "m4a"}
            })
        );

        let image = serde_json::to_value(ContentPart::image(&PNG_MAGIC)).unwrap();
        assert_eq!(image["type"], "image_url");
        assert!(image["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_image_mime_defaults_to_jpeg() {
        assert_eq!(image_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(image_mime(b"not an image"), "image/jpeg");
        assert_eq!(image_mime(&PNG_MAGIC), "image/png");
    }

    #[test]
    fn test_classify_statuses() {
        let ok = GatewayReply {
            status: 200,
            body: completion("{\"summary\":\"S\"}").to_string(),
        };
        assert_eq!(ok.classify().unwrap(), "{\"summary\":\"S\"}");

        let long_body = "x".repeat(1000);
        match (GatewayReply {
            status: 401,
            body: long_body.clone(),
        })
        .classify()
        {
            Err(GatewayError::Unauthorized(detail)) => assert_eq!(detail.len(), 300),
            other => panic!("unexpected: {:?}", other),
        }

        assert!(matches!(
            GatewayReply { status: 402, body: "quota".into() }.classify(),
            Err(GatewayError::PaymentRequired(d)) if d == "quota"
        ));
        assert!(matches!(
            GatewayReply { status: 201, body: String::new() }.classify(),
            Err(GatewayError::Transport { status: 201, .. })
        ));
        assert!(matches!(
            GatewayReply { status: 200, body: "<html>".into() }.classify(),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn test_classify_null_content_is_empty_reply() {
        let reply = GatewayReply {
            status: 200,
            body: json!({"choices": [{"message": {"role": "assistant", "content": null}}]})
                .to_string(),
        };
        assert_eq!(reply.classify().unwrap(), "");
    }

    #[tokio::test]
    async fn test_send_posts_expected_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({
                "model": "qwen3-omni-flash",
                "temperature": 0.2,
                "messages": [{
                    "role": "user",
                    "content": [{"type": "text", "text": "只输出 JSON"}]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"title\":\"T\"}")))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .send(GatewayRequest::text("test", "只输出 JSON"))
            .await
            .unwrap();
        assert_eq!(reply, "{\"title\":\"T\"}");
    }

    #[tokio::test]
    async fn test_send_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("Arrearage: quota exhausted"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(GatewayRequest::text("test", "x"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::PaymentRequired("Arrearage: quota exhausted".to_string())
        );
    }

    #[tokio::test]
    async fn test_send_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send(GatewayRequest::text("test", "x"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Transport {
                status: 503,
                detail: "busy".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_and_placeholder_keys_skip_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("x")))
            .expect(0)
            .mount(&server)
            .await;

        let missing =
            ChatClient::new(GatewayConfig::default().with_base_url(server.uri())).unwrap();
        assert_eq!(
            missing.send(GatewayRequest::text("t", "x")).await.unwrap_err(),
            GatewayError::MissingCredential
        );

        let placeholder = ChatClient::new(
            GatewayConfig::default()
                .with_base_url(server.uri())
                .with_api_key("YOUR_OPENROUTER_API_KEY"),
        )
        .unwrap();
        assert_eq!(
            placeholder
                .send(GatewayRequest::text("t", "x"))
                .await
                .unwrap_err(),
            GatewayError::InvalidCredential
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = GatewayConfig::default()
            .with_base_url("http://127.0.0.1:9")
            .with_api_key("test-key");
        let err = ChatClient::new(config)
            .unwrap()
            .send(GatewayRequest::text("t", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Network(_)));
    }
}
