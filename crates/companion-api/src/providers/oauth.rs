use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use super::{IdentityProvider, OAuthIdentity, ProviderError, check_status, http_client};

/// Trades a social-login session id for the user's identity.
pub struct SessionExchangeClient {
    client: reqwest::Client,
    session_url: String,
}

#[derive(Deserialize)]
struct SessionData {
    email: String,
    name: String,
    picture: Option<String>,
    session_token: String,
}

impl SessionExchangeClient {
    pub fn new(session_url: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(30)?,
            session_url: session_url.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for SessionExchangeClient {
    async fn exchange(&self, session_id: &str) -> Result<Option<OAuthIdentity>, ProviderError> {
        let resp = self
            .client
            .get(&self.session_url)
            .header("X-Session-ID", session_id)
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST) {
            warn!("OAuth session rejected ({})", resp.status());
            return Ok(None);
        }
        let data: SessionData = check_status(resp).await?.json().await?;
        Ok(Some(OAuthIdentity {
            email: data.email,
            name: data.name,
            picture: data.picture,
            session_token: data.session_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn exchange_returns_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("x-session-id", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ext-1",
                "email": "g@example.com",
                "name": "Gee",
                "picture": "https://img.example/g.png",
                "session_token": "tok-123"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("x-session-id", "bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SessionExchangeClient::new(server.uri()).unwrap();
        let identity = client.exchange("good").await.unwrap().unwrap();
        assert_eq!(identity.email, "g@example.com");
        assert_eq!(identity.session_token, "tok-123");
        assert!(client.exchange("bad").await.unwrap().is_none());
    }
}
