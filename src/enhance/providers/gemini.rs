//! Gemini (Google) background enhancer.

use crate::enhance::prompt::{build_instruction, SYSTEM_INSTRUCTION};
use crate::enhance::provider::BackgroundEnhancer;
use crate::enhance::types::{
    EnhanceMetadata, EnhanceRequest, EnhancedImage, ImageFormat, SourceImage,
};
use crate::error::{parse_retry_after, sanitize_error_message, BackdropError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Gemini 2.5 Flash Image (fast, economical).
    #[default]
    Flash,
    /// Gemini 3 Pro Image (highest quality).
    Pro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flash => "gemini-2.5-flash-image",
            Self::Pro => "gemini-3-pro-image-preview",
        }
    }
}

impl FromStr for GeminiModel {
    type Err = BackdropError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flash" | "gemini-2.5-flash-image" => Ok(Self::Flash),
            "pro" | "gemini-3-pro-image-preview" => Ok(Self::Pro),
            other => Err(BackdropError::InvalidRequest(format!(
                "unknown Gemini model: {other}"
            ))),
        }
    }
}

/// Builder for [`GeminiEnhancer`].
#[derive(Debug, Clone, Default)]
pub struct GeminiEnhancerBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
}

impl GeminiEnhancerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the models endpoint (a proxy or a local test server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Builds the enhancer, resolving the API key.
    pub fn build(self) -> Result<GeminiEnhancer> {
        let non_blank = |k: &String| !k.trim().is_empty();
        let api_key = self
            .api_key
            .filter(non_blank)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(non_blank))
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok().filter(non_blank))
            .ok_or_else(|| {
                BackdropError::Auth(
                    "GEMINI_API_KEY not set and no API key provided".into(),
                )
            })?;

        Ok(GeminiEnhancer {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
            base_url: self.base_url.unwrap_or_else(|| API_BASE.to_string()),
        })
    }
}

/// Gemini background enhancer.
pub struct GeminiEnhancer {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
}

impl GeminiEnhancer {
    /// Creates a new `GeminiEnhancerBuilder`.
    pub fn builder() -> GeminiEnhancerBuilder {
        GeminiEnhancerBuilder::new()
    }

    /// Returns the configured model.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    async fn enhance_impl(&self, request: &EnhanceRequest) -> Result<EnhancedImage> {
        let start = Instant::now();

        let url = format!("{}/{}:generateContent", self.base_url, self.model.as_str());
        let body = GeminiRequest::from_enhance_request(request);

        tracing::debug!(
            model = self.model.as_str(),
            style = request.style.name(),
            aspect_ratio = %request.aspect_ratio,
            image_bytes = request.image.data.len(),
            "sending enhancement request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let extracted = extract_image(gemini_response)?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(&extracted.inline_data.data)
            .map_err(|e| BackdropError::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(&extracted.inline_data.mime_type)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            model = self.model.as_str(),
            duration_ms,
            bytes = data.len(),
            "enhancement succeeded"
        );

        Ok(EnhancedImage::new(
            data,
            format,
            EnhanceMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
                text: extracted.text,
            },
        ))
    }
}

const MODEL_NOT_FOUND: &str = "Model not found. Verify the model name is correct.";

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> BackdropError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return BackdropError::Api {
            status,
            message: MODEL_NOT_FOUND.into(),
        };
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return BackdropError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return BackdropError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return BackdropError::Blocked(text);
    }
    BackdropError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl BackgroundEnhancer for GeminiEnhancer {
    async fn enhance(&self, request: &EnhanceRequest) -> Result<EnhancedImage> {
        self.enhance_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(BackdropError::Auth("Invalid API key".into())),
            404 => Err(BackdropError::Api {
                status: 404,
                message: MODEL_NOT_FOUND.into(),
            }),
            s if !(200..300).contains(&s) => Err(BackdropError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// The image part picked out of a response, plus any text that came with it.
#[derive(Debug)]
struct ExtractedImage {
    inline_data: InlineData,
    text: Option<String>,
}

/// Applies the failure policy to a decoded response.
fn extract_image(response: GeminiResponse) -> Result<ExtractedImage> {
    // Prompt-level blocks arrive as HTTP 200 with no candidates
    if let Some(feedback) = response.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .unwrap_or_else(|| format!("prompt blocked: {reason}"));
            return Err(BackdropError::Blocked(msg));
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(BackdropError::NoImage)?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            tracing::warn!(finish_reason = reason, "generation did not finish normally");
            return Err(BackdropError::Blocked(format!(
                "generation stopped with reason {reason}"
            )));
        }
    }

    let parts = candidate
        .content
        .map(|c| c.parts)
        .filter(|p| !p.is_empty())
        .ok_or(BackdropError::NoImage)?;

    let mut texts = Vec::new();
    let mut image = None;
    for part in parts {
        if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
            texts.push(text.trim().to_string());
        }
        if image.is_none() {
            image = part.inline_data;
        }
    }
    let text = (!texts.is_empty()).then(|| texts.join("\n"));

    match (image, text) {
        (Some(inline_data), text) => Ok(ExtractedImage { inline_data, text }),
        (None, Some(text)) => Err(BackdropError::TextInsteadOfImage(text)),
        (None, None) => Err(BackdropError::NoImage),
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text { text: String },
    InlineData { inline_data: GeminiInlineData },
}

impl GeminiRequestPart {
    fn image(source: &SourceImage) -> Self {
        Self::InlineData {
            inline_data: GeminiInlineData {
                mime_type: source.format.mime_type().to_string(),
                data: source.to_base64(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
}

impl GeminiRequest {
    fn from_enhance_request(req: &EnhanceRequest) -> Self {
        // Product first, then the replacement background, then the instruction
        let mut parts = vec![GeminiRequestPart::image(&req.image)];
        if let Some(background) = req.style.background_image() {
            parts.push(GeminiRequestPart::image(background));
        }
        parts.push(GeminiRequestPart::Text {
            text: build_instruction(&req.style, req.aspect_ratio),
        });

        Self {
            system_instruction: GeminiContent {
                parts: vec![GeminiRequestPart::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                // TEXT is requested only so refusals come back readable
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, alias = "inline_data")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::enhance::types::{AspectRatio, BackgroundStyle};

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    fn product() -> SourceImage {
        SourceImage::from_bytes(PNG_MAGIC.to_vec())
    }

    #[test]
    fn test_gemini_model_as_str() {
        assert_eq!(GeminiModel::Flash.as_str(), "gemini-2.5-flash-image");
        assert_eq!(GeminiModel::default(), GeminiModel::Flash);
        assert_eq!("pro".parse::<GeminiModel>().unwrap(), GeminiModel::Pro);
        assert!("dall-e".parse::<GeminiModel>().is_err());
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let enhancer = GeminiEnhancerBuilder::new()
            .api_key("test-key")
            .model(GeminiModel::Pro)
            .build()
            .unwrap();
        assert_eq!(enhancer.model(), GeminiModel::Pro);
        assert_eq!(enhancer.name(), "Gemini (Google)");
    }

    #[test]
    fn test_request_has_system_instruction_and_both_modalities() {
        let req = EnhanceRequest::new(product());
        let json = serde_json::to_value(GeminiRequest::from_enhance_request(&req)).unwrap();

        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            SYSTEM_INSTRUCTION
        );
        assert_eq!(
            json["generationConfig"]["responseModalities"],
            serde_json::json!(["IMAGE", "TEXT"])
        );
        assert!(json.get("generation_config").is_none());

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/png");
        assert!(parts[1]["text"].as_str().unwrap().contains("1:1"));
    }

    #[test]
    fn test_custom_background_sends_second_image() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(12, 0);
        let req = EnhanceRequest::new(product())
            .with_style(BackgroundStyle::Custom {
                image: SourceImage::from_bytes(jpeg),
            })
            .with_aspect_ratio(AspectRatio::Portrait);
        let json = serde_json::to_value(GeminiRequest::from_enhance_request(&req)).unwrap();

        let parts = json["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inline_data"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inline_data"]["mimeType"], "image/jpeg");
        assert!(parts[2]["text"].as_str().unwrap().contains("9:16"));
    }

    #[test]
    fn test_solid_style_sends_one_image() {
        let req = EnhanceRequest::new(product()).with_style(BackgroundStyle::Solid {
            color: Color::WHITE,
        });
        let gemini_req = GeminiRequest::from_enhance_request(&req);
        assert_eq!(gemini_req.contents[0].parts.len(), 2);
    }

    #[test]
    fn test_extracts_first_inline_image() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here you go"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "/9j/"}}
                    ]
                },
                "finishReason": "STOP"
            }]
        }"#,
        );
        let extracted = extract_image(resp).unwrap();
        assert_eq!(extracted.inline_data.mime_type, "image/png");
        assert_eq!(extracted.inline_data.data, "iVBORw0KGgo=");
        assert_eq!(extracted.text.as_deref(), Some("Here you go"));
    }

    #[test]
    fn test_text_only_response_is_rejected_with_text() {
        let resp = parse(
            r#"{
            "candidates": [{
                "content": {"parts": [{"text": "I can't edit photos of people."}]},
                "finishReason": "STOP"
            }]
        }"#,
        );
        match extract_image(resp) {
            Err(BackdropError::TextInsteadOfImage(text)) => {
                assert_eq!(text, "I can't edit photos of people.")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_non_stop_finish_reason_is_blocked() {
        for reason in ["IMAGE_SAFETY", "SAFETY", "MAX_TOKENS", "OTHER"] {
            let json = format!(r#"{{"candidates": [{{"finishReason": "{reason}"}}]}}"#);
            match extract_image(parse(&json)) {
                Err(BackdropError::Blocked(msg)) => assert!(msg.contains(reason)),
                other => panic!("unexpected for {reason}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_prompt_feedback_block() {
        let resp = parse(
            r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "blockReasonMessage": "Prompt was blocked due to safety"
            }
        }"#,
        );
        match extract_image(resp) {
            Err(BackdropError::Blocked(msg)) => assert_eq!(msg, "Prompt was blocked due to safety"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_responses_have_no_image() {
        for json in [
            r#"{}"#,
            r#"{"candidates": []}"#,
            r#"{"candidates": [{"finishReason": "STOP"}]}"#,
            r#"{"candidates": [{"content": {"parts": []}}]}"#,
            r#"{"candidates": [{"content": {"parts": [{}]}}]}"#,
        ] {
            assert!(
                matches!(extract_image(parse(json)), Err(BackdropError::NoImage)),
                "{json}"
            );
        }
    }

    #[test]
    fn test_parse_error_statuses() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(
            parse_error(401, "bad key", &headers),
            BackdropError::Auth(_)
        ));
        assert!(matches!(
            parse_error(429, "", &headers),
            BackdropError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            parse_error(400, "request blocked by safety", &headers),
            BackdropError::Blocked(_)
        ));
        assert!(matches!(
            parse_error(500, "internal", &headers),
            BackdropError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_unknown_model_is_reported_as_remote_failure() {
        let headers = reqwest::header::HeaderMap::new();
        let err = parse_error(404, "models/foo is not found", &headers);
        assert!(matches!(err, BackdropError::Api { status: 404, .. }));
        assert!(err.is_remote());
        assert_eq!(
            err.user_message(),
            format!("Enhancement failed: API error: 404 - {MODEL_NOT_FOUND}")
        );
    }

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let enhancer = GeminiEnhancerBuilder::new()
            .api_key("test-key")
            .base_url("http://127.0.0.1:9/v1beta/models/")
            .build()
            .unwrap();
        assert_eq!(enhancer.base_url, "http://127.0.0.1:9/v1beta/models");

        let enhancer = GeminiEnhancerBuilder::new().api_key("test-key").build().unwrap();
        assert_eq!(enhancer.base_url, API_BASE);
    }

    /// Answers a single HTTP request with `status` and `body`, handing back the raw request.
    async fn serve_once(
        status: u16,
        body: String,
    ) -> (String, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
                if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&received[..end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if received.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&received).into_owned()
        });
        (format!("http://{addr}/v1beta/models"), handle)
    }

    fn local_enhancer(base_url: &str) -> GeminiEnhancer {
        let mut enhancer = GeminiEnhancer::builder()
            .api_key("test-key")
            .base_url(base_url)
            .build()
            .unwrap();
        // Keep the loopback request away from any proxy set in the environment
        enhancer.client = reqwest::Client::builder().no_proxy().build().unwrap();
        enhancer
    }

    fn image_response(mime_type: &str, data: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Done"},
                    {"inlineData": {"mimeType": mime_type, "data": data}}
                ]},
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_enhance_round_trip_sniffs_unlabelled_png() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(PNG_MAGIC);
        let (base_url, server) =
            serve_once(200, image_response("application/octet-stream", &encoded)).await;

        let enhanced = local_enhancer(&base_url)
            .enhance(&EnhanceRequest::new(product()))
            .await
            .unwrap();

        assert_eq!(enhanced.data, PNG_MAGIC.to_vec());
        assert_eq!(enhanced.format, ImageFormat::Png);
        assert_eq!(
            enhanced.metadata.model.as_deref(),
            Some("gemini-2.5-flash-image")
        );
        assert_eq!(enhanced.metadata.text.as_deref(), Some("Done"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1beta/models/gemini-2.5-flash-image:generateContent "));
        assert!(request.to_lowercase().contains("x-goog-api-key: test-key"));
        assert!(request.contains("systemInstruction"));
    }

    #[tokio::test]
    async fn test_enhance_maps_http_status() {
        let (base_url, server) = serve_once(404, r#"{"error": {"code": 404}}"#.into()).await;

        let err = local_enhancer(&base_url)
            .enhance(&EnhanceRequest::new(product()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackdropError::Api { status: 404, .. }));
        assert!(err.user_message().starts_with("Enhancement failed"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_enhance_rejects_undecodable_image_data() {
        let (base_url, server) =
            serve_once(200, image_response("image/png", "not base64 at all!")).await;

        let err = local_enhancer(&base_url)
            .enhance(&EnhanceRequest::new(product()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackdropError::Decode(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_health_check_reports_missing_model() {
        let (base_url, server) = serve_once(404, "{}".into()).await;

        let err = local_enhancer(&base_url).health_check().await.unwrap_err();
        assert!(matches!(err, BackdropError::Api { status: 404, .. }));
        let request = server.await.unwrap();
        assert!(request.starts_with("GET /v1beta/models/gemini-2.5-flash-image "));
    }
}
