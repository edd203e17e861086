use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use companion_types::models::{Message, Sender};

use super::{AiProvider, ImageData, ProviderError, check_status, http_client};

/// OpenAI-compatible REST API (chat completions, images, speech).
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    image_model: String,
    tts_model: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub image_model: String,
    pub tts_model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'static str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(60)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            chat_model: config.chat_model,
            image_model: config.image_model,
            tts_model: config.tts_model,
        })
    }

    fn post(&self, path: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let key = self.api_key.as_deref().ok_or(ProviderError::NotConfigured("LLM_API_KEY"))?;
        Ok(self.client.post(format!("{}{}", self.base_url, path)).bearer_auth(key))
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn chat(&self, system_prompt: &str, history: &[Message], user_message: &str) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage { role: "system", content: system_prompt });
        for m in history {
            let role = match m.sender {
                Sender::User => "user",
                Sender::Ai => "assistant",
            };
            messages.push(ChatMessage { role, content: &m.content });
        }
        messages.push(ChatMessage { role: "user", content: user_message });

        debug!("Chat completion with {} turns", messages.len());
        let body = ChatRequest { model: &self.chat_model, messages };
        let resp = check_status(self.post("/chat/completions")?.json(&body).send().await?).await?;
        let parsed: ChatResponse = resp.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no completion choices".into()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImageData, ProviderError> {
        let body = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: "1024x1024",
            response_format: "b64_json",
        };
        let resp = check_status(self.post("/images/generations")?.json(&body).send().await?).await?;
        let parsed: ImageResponse = resp.json().await?;

        let base64 = parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.b64_json)
            .ok_or_else(|| ProviderError::Malformed("no image returned".into()))?;
        Ok(ImageData { base64, mime_type: "image/png".into() })
    }

    async fn speech(&self, text: &str, voice: &str) -> Result<Vec<u8>, ProviderError> {
        let body = SpeechRequest {
            model: &self.tts_model,
            input: text,
            voice,
            response_format: "mp3",
        };
        let resp = check_status(self.post("/audio/speech")?.json(&body).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Standard base64 as used in JSON bodies.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(OpenAiConfig {
            api_key: key.map(str::to_string),
            base_url: format!("{}/v1/", server.uri()),
            chat_model: "gpt-test".into(),
            image_model: "img-test".into(),
            tts_model: "tts-test".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn chat_sends_history_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "earlier"},
                    {"role": "user", "content": "now"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi!"}}]
            })))
            .mount(&server)
            .await;

        let history = vec![Message {
            id: "m1".into(),
            chat_id: "u_c".into(),
            user_id: "u".into(),
            character_id: "c".into(),
            sender: Sender::User,
            content: "earlier".into(),
            timestamp: Utc::now(),
        }];
        let reply = client(&server, Some("sk-test")).chat("be nice", &history, "now").await.unwrap();
        assert_eq!(reply, "hi!");
    }

    #[tokio::test]
    async fn upstream_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server, Some("sk")).generate_image("a cat").await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let server = MockServer::start().await;
        let err = client(&server, None).speech("hello", "nova").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
