//! Free provider: the unofficial Google translate endpoint.
//! Replies are nested arrays; `data[0]` holds one `[translated, source, ..]`
//! row per sentence segment.

use async_trait::async_trait;
use tracing::debug;

use super::{json_body, status_error, transport_error};
use crate::translate::{Provider, ProviderKind, TranslateError};

pub struct GoogleFreeClient {
    http: reqwest::Client,
    base_url: String,
    target_lang: String,
}

impl GoogleFreeClient {
    pub fn new(http: reqwest::Client, base_url: &str, target_lang: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            target_lang: target_lang.to_string(),
        }
    }
}

/// Concatenate every string segment of `data[0][i][0]`.
pub fn extract_segments(data: &serde_json::Value) -> Result<String, TranslateError> {
    let rows = data
        .get(0)
        .and_then(|v| v.as_array())
        .ok_or_else(|| TranslateError::MalformedResponse("missing segment list".into()))?;
    let text: String = rows
        .iter()
        .filter_map(|row| row.get(0).and_then(|s| s.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(TranslateError::MalformedResponse("no translated segments".into()));
    }
    Ok(text)
}

#[async_trait]
impl Provider for GoogleFreeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Free
    }

    async fn translate(
        &self,
        text: &str,
        _credential: Option<&str>,
    ) -> Result<String, TranslateError> {
        let resp = self
            .http
            .get(format!("{}/translate_a/single", self.base_url))
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target_lang.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let data = json_body(resp).await?;
        let translated = extract_segments(&data)?;
        debug!(chars = translated.chars().count(), "free provider replied");
        Ok(translated)
    }
}
