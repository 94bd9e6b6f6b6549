//! Social-network announcements
//!
//! `XAnnouncer` posts `{"text": ...}` to the configured endpoint, signed with
//! an OAuth 1.0a HMAC-SHA1 `Authorization` header. The JSON body is not part
//! of the signature base string.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use data_encoding::BASE64;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha1::Sha1;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SocialConfig;

type HmacSha1 = Hmac<Sha1>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, text: &str) -> Result<()>;
}

pub type DynAnnouncer = Arc<dyn Announcer>;

pub fn announcer_from_config(config: &SocialConfig) -> Result<DynAnnouncer> {
    if config.enabled {
        Ok(Arc::new(XAnnouncer::from_config(config)?))
    } else {
        Ok(Arc::new(DisabledAnnouncer))
    }
}

/// OAuth 1.0a user-context credentials
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: String,
    pub token_secret: String,
}

impl OAuthCredentials {
    /// `Authorization` header value for one request
    pub fn authorization_header(&self, method: &str, url: &str, nonce: &str, timestamp: i64) -> Result<String> {
        let timestamp = timestamp.to_string();
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", "1.0"),
        ];
        let signature = self.signature(method, url, &oauth_params)?;
        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort_by(|a, b| a.0.cmp(b.0));

        let fields: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }

    /// Base64 HMAC-SHA1 over the signature base string of `params`
    pub fn signature(&self, method: &str, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
            .collect();
        encoded.sort();
        let parameter_string = encoded
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            urlencoding::encode(url),
            urlencoding::encode(&parameter_string)
        );
        let key = format!(
            "{}&{}",
            urlencoding::encode(&self.consumer_secret),
            urlencoding::encode(&self.token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())
            .map_err(|e| anyhow!("Invalid signing key: {}", e))?;
        mac.update(base.as_bytes());
        Ok(BASE64.encode(&mac.finalize().into_bytes()))
    }
}

pub struct XAnnouncer {
    client: reqwest::Client,
    endpoint: String,
    credentials: OAuthCredentials,
}

impl XAnnouncer {
    pub fn from_config(config: &SocialConfig) -> Result<Self> {
        if config.api_key.is_empty() || config.access_token.is_empty() {
            return Err(anyhow!("Social posting enabled but credentials are missing"));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("newsroom/", env!("CARGO_PKG_VERSION")))
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            credentials: OAuthCredentials {
                consumer_key: config.api_key.clone(),
                consumer_secret: config.api_secret.clone(),
                token: config.access_token.clone(),
                token_secret: config.access_token_secret.clone(),
            },
        })
    }
}

#[async_trait]
impl Announcer for XAnnouncer {
    async fn announce(&self, text: &str) -> Result<()> {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let header = self
            .credentials
            .authorization_header("POST", &self.endpoint, &nonce, Utc::now().timestamp())?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, header)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("Failed to reach social endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Social post rejected: {} {}", status, body));
        }
        Ok(())
    }
}

/// Used when social posting is turned off
pub struct DisabledAnnouncer;

#[async_trait]
impl Announcer for DisabledAnnouncer {
    async fn announce(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "Social posting disabled, skipping announcement");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn documented_credentials() -> OAuthCredentials {
        OAuthCredentials {
            consumer_key: "xvz1evFS4wEEPTGEFPHBog".to_string(),
            consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw".to_string(),
            token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb".to_string(),
            token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE".to_string(),
        }
    }

    #[test]
    fn test_signature_matches_published_example() {
        let params = [
            ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ("include_entities", "true"),
            ("oauth_consumer_key", "xvz1evFS4wEEPTGEFPHBog"),
            ("oauth_nonce", "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg"),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
            ("oauth_version", "1.0"),
        ];
        let signature = documented_credentials()
            .signature("post", "https://api.twitter.com/1.1/statuses/update.json", &params)
            .unwrap();
        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_authorization_header_shape() {
        let header = documented_credentials()
            .authorization_header("POST", "https://api.twitter.com/2/tweets", "abc123", 1_700_000_000)
            .unwrap();

        assert!(header.starts_with("OAuth "));
        for key in [
            "oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\"",
            "oauth_nonce=\"abc123\"",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=\"1700000000\"",
            "oauth_version=\"1.0\"",
            "oauth_signature=\"",
        ] {
            assert!(header.contains(key), "missing {} in {}", key, header);
        }
    }

    #[test]
    fn test_x_announcer_requires_credentials() {
        let config = SocialConfig {
            enabled: true,
            ..SocialConfig::default()
        };
        assert!(XAnnouncer::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_disabled_announcer() {
        let announcer = announcer_from_config(&SocialConfig::default()).unwrap();
        assert!(announcer.announce("New Article Added: Test, by: alice").await.is_ok());
    }
}
