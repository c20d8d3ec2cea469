//! KeyedB provider: DeepL `/v2/translate`.

use async_trait::async_trait;
use serde::Serialize;

use super::{json_body, status_error, transport_error};
use crate::translate::{Provider, ProviderKind, TranslateError};

const FREE_HOST: &str = "https://api-free.deepl.com";
const PRO_HOST: &str = "https://api.deepl.com";

/// Keys issued for the free plan end in `:fx` and live on a separate host.
pub fn host_for_key(api_key: &str) -> &'static str {
    if api_key.ends_with(":fx") {
        FREE_HOST
    } else {
        PRO_HOST
    }
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    text: [&'a str; 1],
    target_lang: &'a str,
}

pub struct DeepLClient {
    http: reqwest::Client,
    base_url: Option<String>,
    target_lang: String,
}

impl DeepLClient {
    pub fn new(http: reqwest::Client, base_url: Option<&str>, target_lang: &str) -> Self {
        Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            target_lang: target_lang.to_uppercase(),
        }
    }
}

/// Pull `translations[0].text`, trimmed and non-empty.
pub fn extract_text(data: &serde_json::Value) -> Result<String, TranslateError> {
    data.pointer("/translations/0/text")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TranslateError::MalformedResponse("no translations in reply".into()))
}

#[async_trait]
impl Provider for DeepLClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::KeyedB
    }

    async fn translate(
        &self,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, TranslateError> {
        let api_key = credential.ok_or(TranslateError::ConfigurationMissing(ProviderKind::KeyedB))?;
        let host = self.base_url.as_deref().unwrap_or_else(|| host_for_key(api_key));

        let resp = self
            .http
            .post(format!("{host}/v2/translate"))
            .header("Authorization", format!("DeepL-Auth-Key {api_key}"))
            .json(&TranslateBody {
                text: [text],
                target_lang: &self.target_lang,
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        extract_text(&json_body(resp).await?)
    }
}
