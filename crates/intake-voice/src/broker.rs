use crate::config::VoiceConfig;
use crate::error::VoiceError;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A short-lived, scope-limited credential for the speech service.
#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralToken(String);

impl EphemeralToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EphemeralToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralToken([REDACTED])")
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    voice: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: Option<String>,
}

/// Calls the backend broker and the remote speech service.
#[derive(Debug, Clone)]
pub struct VoiceBroker {
    http: reqwest::Client,
    token_url: String,
    realtime_url: String,
    model: String,
}

impl VoiceBroker {
    pub fn new(config: &VoiceConfig) -> Result<Self, VoiceError> {
        if config.token_url.is_empty() {
            return Err(VoiceError::Config("voice token_url is not set".to_string()));
        }
        if config.realtime_url.is_empty() {
            return Err(VoiceError::Config(
                "voice realtime_url is not set".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VoiceError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            token_url: config.token_url.clone(),
            realtime_url: config.realtime_url.clone(),
            model: config.model.clone(),
        })
    }

    /// Asks the broker for an ephemeral credential bound to `voice`.
    pub async fn request_token(&self, voice: &str) -> Result<EphemeralToken, VoiceError> {
        let response = self
            .http
            .post(&self.token_url)
            .json(&TokenRequest { voice })
            .send()
            .await
            .map_err(|e| VoiceError::TokenBroker(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::TokenBroker(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(VoiceError::TokenBroker(format!("{}: {}", status, body)));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| VoiceError::TokenBroker(format!("malformed token response: {}", e)))?;

        parsed
            .client_secret
            .and_then(|secret| secret.value)
            .filter(|value| !value.trim().is_empty())
            .map(EphemeralToken)
            .ok_or_else(|| {
                VoiceError::TokenBroker("response did not include client_secret.value".to_string())
            })
    }

    /// Posts the offer SDP to the speech service and returns the answer SDP.
    pub async fn exchange_sdp(
        &self,
        offer_sdp: &str,
        token: &EphemeralToken,
    ) -> Result<String, VoiceError> {
        let mut request = self.http.post(&self.realtime_url);
        if !self.model.is_empty() {
            request = request.query(&[("model", self.model.as_str())]);
        }

        let response = request
            .bearer_auth(token.expose())
            .header(CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| VoiceError::RemoteNegotiation(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            VoiceError::RemoteNegotiation(format!("failed to read answer: {}", e))
        })?;

        if !status.is_success() {
            return Err(VoiceError::RemoteNegotiation(format!("{}: {}", status, body)));
        }
        if body.trim().is_empty() {
            return Err(VoiceError::RemoteNegotiation(
                "speech service returned an empty answer".to_string(),
            ));
        }

        Ok(body)
    }
}
