use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use ribbonconfig::{ParameterSet, PublishedConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const GET_CONFIG: &str = "get_config";
const SET_CONFIG: &str = "set_config";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("invalid remote endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("no publish credential configured")]
    MissingCredential,
    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected remote response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("remote rejected the request: {0}")]
    Rejected(String),
}

/// Remote store for the published parameter subset.
pub trait ConfigRemote {
    /// The currently published configuration, or `None` if nothing has been
    /// published yet.
    fn get(&self) -> Result<Option<PublishedConfig>, RemoteError>;

    fn set(&self, config: &PublishedConfig) -> Result<(), RemoteError>;
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    credential: &'a str,
}

#[derive(Debug, Serialize)]
struct SetRequest<'a> {
    credential: &'a str,
    config: &'a PublishedConfig,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    config: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RpcReply {
    fn into_result(self) -> Result<Option<Value>, RemoteError> {
        if self.success {
            Ok(self.config.filter(|config| !config.is_null()))
        } else {
            Err(RemoteError::Rejected(
                self.error.unwrap_or_else(|| "no reason given".into()),
            ))
        }
    }
}

fn decode_reply(body: &str) -> Result<Option<Value>, RemoteError> {
    serde_json::from_str::<RpcReply>(body)?.into_result()
}

/// Interprets a published JSON object leniently: unknown keys, mistyped
/// fields and a stray `colors` group are ignored, missing fields keep their
/// defaults.
pub fn decode_published(value: &Value) -> PublishedConfig {
    let mut value = value.clone();
    if let Some(object) = value.as_object_mut() {
        object.remove("colors");
    }
    let mut params = ParameterSet::default();
    let report = params.merge_json(&value);
    if report.skipped > 0 {
        debug!(
            applied = report.applied,
            skipped = report.skipped,
            "ignored unrecognised fields in published config"
        );
    }
    params.published()
}

/// Blocking JSON client for `{endpoint}/rpc/get_config` and
/// `{endpoint}/rpc/set_config`.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: Client,
    base: Url,
    credential: String,
}

impl RpcClient {
    pub fn new(endpoint: &str, credential: impl Into<String>) -> Result<Self, RemoteError> {
        let credential = credential.into();
        if credential.trim().is_empty() {
            return Err(RemoteError::MissingCredential);
        }
        let trimmed = endpoint.trim().trim_end_matches('/');
        let base = Url::parse(&format!("{trimmed}/rpc/"))
            .map_err(|_| RemoteError::InvalidEndpoint(endpoint.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidEndpoint(endpoint.to_string()));
        }
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            base,
            credential,
        })
    }

    pub fn method_url(&self, method: &str) -> Result<Url, RemoteError> {
        self.base
            .join(method)
            .map_err(|_| RemoteError::InvalidEndpoint(self.base.to_string()))
    }

    fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<Option<Value>, RemoteError> {
        let url = self.method_url(method)?;
        debug!(%url, "calling remote config RPC");
        let text = self.http.post(url).json(body).send()?.text()?;
        decode_reply(&text)
    }
}

impl ConfigRemote for RpcClient {
    fn get(&self) -> Result<Option<PublishedConfig>, RemoteError> {
        let config = self.call(
            GET_CONFIG,
            &GetRequest {
                credential: &self.credential,
            },
        )?;
        Ok(config.as_ref().map(decode_published))
    }

    fn set(&self, config: &PublishedConfig) -> Result<(), RemoteError> {
        self.call(
            SET_CONFIG,
            &SetRequest {
                credential: &self.credential,
                config,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_method_urls() {
        let client = RpcClient::new("https://example.invalid/api/", "secret").unwrap();
        assert_eq!(
            client.method_url(GET_CONFIG).unwrap().as_str(),
            "https://example.invalid/api/rpc/get_config"
        );
        assert!(matches!(
            RpcClient::new("ftp://example.invalid", "secret"),
            Err(RemoteError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            RpcClient::new("https://example.invalid", "  "),
            Err(RemoteError::MissingCredential)
        ));
    }

    #[test]
    fn decodes_success_and_failure_replies() {
        let value = decode_reply(r#"{"success": true, "config": {"wave": {"blend": 0.3}}}"#)
            .unwrap()
            .expect("config");
        assert_eq!(value["wave"]["blend"], json!(0.3));

        assert!(decode_reply(r#"{"success": true}"#).unwrap().is_none());
        assert!(decode_reply(r#"{"success": true, "config": null}"#)
            .unwrap()
            .is_none());

        match decode_reply(r#"{"success": false, "error": "bad credential"}"#) {
            Err(RemoteError::Rejected(reason)) => assert_eq!(reason, "bad credential"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            decode_reply("<html>"),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn published_values_are_decoded_leniently() {
        let published = decode_published(&json!({
            "wave": { "mainSpeed": 3.0, "blend": "loud" },
            "twist": { "enabled": true },
            "colors": { "background": "#ffffff" },
            "extra": 1
        }));
        assert_eq!(published.wave.main_speed, 3.0);
        assert_eq!(published.wave.blend, ParameterSet::default().wave.blend);
        assert!(published.twist.enabled);
    }

    #[test]
    fn set_request_carries_only_the_published_groups() {
        let config = ParameterSet::default().published();
        let body = serde_json::to_value(SetRequest {
            credential: "secret",
            config: &config,
        })
        .unwrap();
        assert_eq!(body["credential"], json!("secret"));
        let keys: Vec<_> = body["config"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 7);
        assert!(!keys.iter().any(|key| key == "colors"));
    }
}
