use crate::config::LLMConfig;
use crate::core::turn::ConversationTurn;
use crate::error::GatewayError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces the assistant reply for a fully assembled prompt.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, GatewayError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions client. A single attempt per call: the user's next
/// message is the retry.
pub struct LLMClient {
    client: Client,
    api_key: Option<String>,
    config: LLMConfig,
}

impl LLMClient {
    pub fn new(api_key: Option<String>, config: LLMConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }
}

#[async_trait]
impl CompletionGateway for LLMClient {
    async fn complete(&self, messages: &[ConversationTurn]) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingCredential)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        tracing::debug!(
            "[LLMClient] Sending {} messages to {}",
            messages.len(),
            self.config.endpoint
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Status { status, body });
        }

        let body = response.text().await?;
        parse_completion(&body)
    }
}

/// Extracts `choices[0].message.content` from a response body.
fn parse_completion(body: &str) -> Result<String, GatewayError> {
    let chat_response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or(GatewayError::NoChoices)?;

    choice
        .message
        .content
        .ok_or_else(|| GatewayError::Malformed("choice message has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LLMConfig {
        let mut config = Settings::default().llm;
        config.endpoint = format!("{}/v1/chat/completions", server.uri());
        config.model = "test-model".to_string();
        config
    }

    #[test]
    fn test_parse_completion_takes_first_choice() {
        let body = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "first"}},
                {"message": {"content": "second"}}
            ]
        })
        .to_string();
        assert_eq!(parse_completion(&body).unwrap(), "first");
    }

    #[test]
    fn test_parse_completion_rejects_malformed_payloads() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(GatewayError::NoChoices)
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{}}]}"#),
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"error":"nope"}"#),
            Err(GatewayError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_sends_expected_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_json(json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hello"}
                ],
                "temperature": 0.7,
                "max_tokens": 500
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = LLMClient::new(Some("secret".to_string()), config_for(&mock_server)).unwrap();
        let messages = vec![
            ConversationTurn::system("be nice"),
            ConversationTurn::user("hello"),
        ];

        let reply = client.complete(&messages).await.unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn test_complete_reports_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&mock_server)
            .await;

        let client = LLMClient::new(Some("secret".to_string()), config_for(&mock_server)).unwrap();
        let result = client.complete(&[ConversationTurn::user("hello")]).await;

        match result {
            Err(GatewayError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_without_credential_fails_fast() {
        let client = LLMClient::new(None, Settings::default().llm).unwrap();
        let result = client.complete(&[ConversationTurn::user("hello")]).await;
        assert!(matches!(result, Err(GatewayError::MissingCredential)));
    }
}
