//! JSON-lines front end: one request per stdin line, one response per stdout
//! line. Requests are handled concurrently; responses carry the request `id`
//! so the caller can match them up.

use std::process::ExitCode;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use chat_translate::translate::normalize::should_skip;
use chat_translate::{EngineConfig, TranslationEngine, TranslationRequest, TranslationResponse};

#[derive(Deserialize)]
struct InboundLine {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(flatten)]
    request: TranslationRequest,
}

#[derive(Serialize)]
struct OutboundLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
    #[serde(flatten)]
    response: TranslationResponse,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
}

fn encode(line: &OutboundLine) -> String {
    serde_json::to_string(line)
        .unwrap_or_else(|e| format!(r#"{{"error":"failed to encode response: {e}"}}"#))
}

#[tokio::main]
async fn main() -> ExitCode {
    chat_translate::init_tracing(std::env::var_os("CHAT_TRANSLATE_LOG_JSON").is_some());

    let config = match EngineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration load failed");
            return ExitCode::FAILURE;
        }
    };
    let engine = match TranslationEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "engine init failed");
            return ExitCode::FAILURE;
        }
    };
    let sweeper = engine.spawn_sweeper();
    info!(
        target_lang = %engine.config().target_lang,
        cache_max = engine.config().cache_max_size,
        "chat-translate ready"
    );

    // single writer keeps response lines whole
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(mut line) = out_rx.recv().await {
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                warn!(error = %e, "stdout closed");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let inbound: InboundLine = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparsable request line");
                let _ = out_tx.send(encode(&OutboundLine {
                    id: None,
                    response: TranslationResponse::Failure {
                        error: format!("invalid request: {e}"),
                    },
                    skipped: false,
                }));
                continue;
            }
        };

        if should_skip(&inbound.request.text) {
            let _ = out_tx.send(encode(&OutboundLine {
                id: inbound.id,
                response: TranslationResponse::Success {
                    translation: String::new(),
                },
                skipped: true,
            }));
            continue;
        }

        let engine = engine.clone();
        let out_tx = out_tx.clone();
        tasks.spawn(async move {
            let response = engine.handle(inbound.request).await;
            let _ = out_tx.send(encode(&OutboundLine {
                id: inbound.id,
                response,
                skipped: false,
            }));
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task failed");
        }
    }
    drop(out_tx);
    let _ = writer.await;

    engine.shutdown();
    let _ = sweeper.await;
    let metrics = engine.metrics();
    for (name, summary) in metrics.summary() {
        info!(
            metric = %name,
            p50_us = summary.p50_us,
            p95_us = summary.p95_us,
            p99_us = summary.p99_us,
            count = summary.count,
            "latency"
        );
    }
    info!(counters = ?metrics.counters(), "chat-translate exiting");
    ExitCode::SUCCESS
}
