#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::OnceLock;

use adverify_common::observability::{LogConfig, LogFormat};

static INIT_PATH: OnceLock<PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "adverify-tests",
            log_dir: Some(std::env::temp_dir().join("adverify-tests")),
            emit_stderr: true,
            format: if std::env::var("ADVERIFY_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
        };

        adverify_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn generation_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "totalTokenCount": 42 }
    })
}
