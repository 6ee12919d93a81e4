use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The fields we need from the service account JSON.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches OAuth2 access tokens for the Sheets API from a
/// base64-encoded service account key. Tokens are refreshed one minute
/// before expiry.
pub struct TokenProvider {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn from_b64(client: Client, sa_json_b64: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(sa_json_b64.trim())
            .map_err(|e| Error::Auth(format!("GOOGLE_SA_JSON_B64 is not valid base64: {}", e)))?;
        let key: ServiceAccountKey = serde_json::from_slice(&raw)
            .map_err(|e| Error::Auth(format!("service account JSON is malformed: {}", e)))?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::Auth(format!("service account private key rejected: {}", e)))?;
        debug!(client_email = %key.client_email, "service account key loaded");
        Ok(Self {
            client,
            key,
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.mint_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    async fn mint_token(&self) -> Result<CachedToken> {
        let now = Utc::now();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(60)).timestamp(),
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Auth(format!("failed to sign JWT assertion: {}", e)))?;

        debug!(token_uri = %self.key.token_uri, "exchanging JWT assertion for access token");
        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", &assertion)])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("token endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("token response malformed: {}", e)))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}
