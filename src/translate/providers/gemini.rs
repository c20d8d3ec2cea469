//! KeyedA provider: Gemini `generateContent` with a fixed translation prompt.

use async_trait::async_trait;
use serde::Serialize;

use super::{json_body, status_error, transport_error};
use crate::translate::{Provider, ProviderKind, TranslateError};

/// Instruction wrapped around every comment. `{text}` is replaced verbatim.
const PROMPT_TEMPLATE: &str = "あなたは、海外のライブ配信やネット文化に精通したプロの翻訳者です。\
以下のチャットコメントを、日本の視聴者が読んで自然に感じる口語的な日本語に翻訳してください。\
ネットスラング、略語、絵文字のニュアンスも汲み取り、元の感情や雰囲気が伝わるように訳してください。\
返答には説明や前置きを付けず、翻訳された日本語テキストだけを返してください。コメント：「{text}」";

pub fn build_prompt(text: &str) -> String {
    PROMPT_TEMPLATE.replace("{text}", text)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

/// Pull `candidates[0].content.parts[0].text`, trimmed and non-empty.
pub fn extract_text(data: &serde_json::Value) -> Result<String, TranslateError> {
    data.pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TranslateError::MalformedResponse("no candidate text in reply".into()))
}

#[async_trait]
impl Provider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::KeyedA
    }

    async fn translate(
        &self,
        text: &str,
        credential: Option<&str>,
    ) -> Result<String, TranslateError> {
        let api_key = credential.ok_or(TranslateError::ConfigurationMissing(ProviderKind::KeyedA))?;
        let prompt = build_prompt(text);
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: &prompt }],
            }],
        };

        let resp = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        extract_text(&json_body(resp).await?)
    }
}
