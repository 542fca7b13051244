//! Gemini REST client for streaming chat and speech synthesis.
//!
//! Implements [`ChatBackend`] against `:streamGenerateContent?alt=sse`
//! and [`SpeechSynthesizer`] against `:generateContent` with the audio
//! response modality. Request bodies follow the Generative Language API
//! JSON shape; streaming responses are decoded incrementally via
//! [`DataLineDecoder`].

use async_trait::async_trait;
use base64::Engine;
use futures_util::StreamExt;
use tracing::{debug, error, info};

use super::sse::DataLineDecoder;
use super::{ChatBackend, ChunkStream, ContextPart, RequestMode, RequestProfile, SpeechSynthesizer};
use crate::chat::message::{Attachment, Role};
use crate::config::GeminiConfig;
use crate::error::{AssistError, Result};

const PATIENT_INSTRUCTION: &str = "You are an AI assistant for a physiotherapy clinic. Give helpful, safe advice on muscle and joint health and rehabilitation. When the user asks to start a guided symptom check, run a step-by-step diagnostic conversation, one question at a time: location, intensity on a 1-10 scale, pain type, duration, aggravating and easing activities. Then give a preliminary assessment and next steps, in markdown. Always include a disclaimer that you are an AI assistant and not a substitute for a professional diagnosis; advise seeing a qualified physiotherapist or doctor for persistent or severe issues.";

const CLINICIAN_INSTRUCTION: &str = "You are an AI clinical assistant for physiotherapists. Be professional, technical, and concise. Assist with differential diagnoses, orthopedic test selection, research summaries, and treatment-plan ideas. Assume a high level of medical knowledge, answer directly in clear markdown, and omit layperson disclaimers.";

const POSTURE_INSTRUCTION: &str = "You are an AI physiotherapy assistant for clinicians. Analyze the provided image for postural assessment: forward head posture, rounded shoulders, pelvic tilt, kyphosis and lordosis. Give a technical breakdown referencing anatomical landmarks and likely muscle imbalances, and close with treatment focus areas. Respond in markdown starting with \"## Posture Analysis Report\".";

const ROM_INSTRUCTION: &str = "You are an AI physiotherapy assistant. The two provided images show the start and end positions of a joint movement. Estimate the range of motion in degrees, comment on mobility, and suggest one or two exercises to improve or maintain it. Respond in markdown starting with \"## Range of Motion Analysis Report\".";

/// Fixed user-visible text sent with a posture analysis image.
const POSTURE_PROMPT: &str = "Analyze the posture in this image.";

/// Gemini REST client.
///
/// Cheap to clone is not a goal here; wrap in `Arc` to share.
pub struct GeminiClient {
    config: GeminiConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client, resolving the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key env var is unset or empty.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Ok(Self::with_api_key(config, api_key))
    }

    /// Create a client with an explicit API key (tests, key managers).
    pub fn with_api_key(config: GeminiConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Context for a single-image posture analysis request.
    pub fn posture_context(image: Attachment) -> Vec<ContextPart> {
        vec![ContextPart::with_images(
            Role::User,
            POSTURE_PROMPT,
            vec![image],
        )]
    }

    /// Context for a two-image range-of-motion analysis request.
    ///
    /// The first image is the starting position, the second the end
    /// position of the movement.
    pub fn range_of_motion_context(
        joint: &str,
        start: Attachment,
        end: Attachment,
    ) -> Vec<ContextPart> {
        vec![ContextPart::with_images(
            Role::User,
            format!("Assess the range of motion of the {joint} across these two images."),
            vec![start, end],
        )]
    }

    /// Pick the model for a request.
    ///
    /// Plain patient chat runs on the low-latency model; thinking mode
    /// and all clinician/analysis profiles run on the reasoning model.
    fn model_for(&self, mode: RequestMode) -> &str {
        if mode.thinking || mode.profile != RequestProfile::Patient {
            &self.config.reasoning_model
        } else {
            &self.config.chat_model
        }
    }
}

/// System instruction text for a request profile.
fn instruction_for(profile: RequestProfile) -> &'static str {
    match profile {
        RequestProfile::Patient => PATIENT_INSTRUCTION,
        RequestProfile::Clinician => CLINICIAN_INSTRUCTION,
        RequestProfile::Posture => POSTURE_INSTRUCTION,
        RequestProfile::RangeOfMotion => ROM_INSTRUCTION,
    }
}

/// Build the JSON body for a streaming completion request.
fn build_stream_request(
    context: &[ContextPart],
    mode: RequestMode,
    thinking_budget: u32,
) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = context.iter().map(content_from_part).collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "systemInstruction": {
            "parts": [{ "text": instruction_for(mode.profile) }]
        },
    });

    if mode.thinking {
        body["generationConfig"] = serde_json::json!({
            "thinkingConfig": { "thinkingBudget": thinking_budget }
        });
    }

    body
}

/// Map one context part to a Gemini `content` object.
fn content_from_part(part: &ContextPart) -> serde_json::Value {
    let mut parts: Vec<serde_json::Value> = Vec::with_capacity(1 + part.images.len());
    parts.push(serde_json::json!({ "text": part.text }));
    for image in &part.images {
        parts.push(serde_json::json!({
            "inlineData": { "mimeType": image.mime_type, "data": image.data }
        }));
    }
    serde_json::json!({ "role": part.role.to_string(), "parts": parts })
}

/// Build the JSON body for a speech synthesis request.
fn build_speech_request(text: &str, voice: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{ "parts": [{ "text": text }] }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice }
                }
            }
        }
    })
}

/// Extract the concatenated text of one streamed response chunk.
///
/// Returns `None` for chunks with no text parts (safety metadata, usage
/// summaries, thinking deltas filtered server-side).
fn extract_text_chunk(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Extract the base64 audio payload from a synthesis response.
fn extract_audio_payload(value: &serde_json::Value) -> Option<&str> {
    value
        .pointer("/candidates/0/content/parts/0/inlineData/data")
        .and_then(|d| d.as_str())
}

/// Extract a human-readable error message from an API error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

#[async_trait]
impl ChatBackend for GeminiClient {
    async fn stream_chat(
        &self,
        context: &[ContextPart],
        mode: RequestMode,
    ) -> Result<ChunkStream> {
        let model = self.model_for(mode);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.api_url, model
        );
        let body = build_stream_request(context, mode, self.config.thinking_budget);

        debug!(model, parts = context.len(), "opening completion stream");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "completion request failed");
                AssistError::Llm(format!("connection error: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            error!(status = %status, "completion request returned error");
            return Err(AssistError::Llm(format!(
                "HTTP {status}: {}",
                extract_error_message(&body)
            )));
        }

        info!(model, "completion stream starting");

        let mut byte_stream = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut decoder = DataLineDecoder::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| {
                    error!(error = %e, "completion stream read error");
                    AssistError::Llm(format!("stream read error: {e}"))
                })?;
                for payload in decoder.push(&chunk) {
                    if let Some(text) = extract_text_chunk(&payload) {
                        yield text;
                    }
                }
            }
            if let Some(payload) = decoder.flush() {
                if let Some(text) = extract_text_chunk(&payload) {
                    yield text;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_url, self.config.tts_model
        );
        let body = build_speech_request(text, &self.config.voice);

        debug!(chars = text.len(), "requesting speech synthesis");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistError::Tts(format!("connection error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            return Err(AssistError::Tts(format!(
                "HTTP {status}: {}",
                extract_error_message(&body)
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistError::Tts(format!("invalid response body: {e}")))?;

        let encoded = extract_audio_payload(&value)
            .ok_or_else(|| AssistError::Tts("no audio data in response".into()))?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AssistError::Tts(format!("invalid base64 audio payload: {e}")))
    }
}
