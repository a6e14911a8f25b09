//! HTTP API server implementation

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{
    TargetLanguage, TranslationRequest, DEFAULT_NEW_TOKENS, MAX_NEW_TOKENS, MIN_NEW_TOKENS,
    NEW_TOKENS_STEP, SOURCE_LANG,
};
use crate::core::session::TranslationSession;

/// Application state
#[derive(Clone)]
pub struct AppState {
    session: Option<TranslationSession>,
    load_error: Option<String>,
    in_flight: Arc<Mutex<()>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// State with a usable session
    pub fn ready(session: TranslationSession) -> Self {
        Self {
            session: Some(session),
            load_error: None,
            in_flight: Arc::new(Mutex::new(())),
            started_at: Utc::now(),
        }
    }

    /// State with translation disabled after a failed model load
    pub fn disabled(error: &TranslationError) -> Self {
        Self {
            session: None,
            load_error: Some(error.to_string()),
            in_flight: Arc::new(Mutex::new(())),
            started_at: Utc::now(),
        }
    }

    pub fn from_load_result(result: Result<TranslationSession>) -> Self {
        match result {
            Ok(session) => Self::ready(session),
            Err(e) => {
                warn!("Translation disabled: {}", e);
                Self::disabled(&e)
            }
        }
    }

    pub fn translation_available(&self) -> bool {
        self.session.is_some()
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    started_at: DateTime<Utc>,
    translation_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Languages response
#[derive(Serialize)]
struct LanguagesResponse {
    source: String,
    targets: Vec<LanguageInfo>,
    max_new_tokens: TokenBounds,
}

#[derive(Serialize)]
struct LanguageInfo {
    code: String,
    label: String,
}

#[derive(Serialize)]
struct TokenBounds {
    min: usize,
    max: usize,
    step: usize,
    default: usize,
}

/// Translation request body
#[derive(Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_lang: String,
    pub max_new_tokens: Option<usize>,
}

/// Translation response body
#[derive(Serialize)]
pub struct TranslateResponse {
    pub translation: String,
    pub target_lang: TargetLanguage,
    pub model: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
}

type ApiError = (StatusCode, axum::Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>, code: &str) -> ApiError {
    let error_type = if status.is_client_error() {
        "invalid_request_error"
    } else {
        "api_error"
    };

    (
        status,
        axum::Json(ErrorResponse {
            error: ErrorDetail {
                message: message.into(),
                code: Some(code.to_string()),
                r#type: Some(error_type.to_string()),
            },
        }),
    )
}

impl From<TranslationError> for ApiError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::InvalidRequest { message } => {
                api_error(StatusCode::BAD_REQUEST, message, "invalid_request")
            }
            TranslationError::Cancelled => {
                api_error(StatusCode::CONFLICT, err.to_string(), "cancelled")
            }
            other => api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                other.to_string(),
                "translation_error",
            ),
        }
    }
}

/// Web form
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check handler
async fn health_check(State(state): State<Arc<AppState>>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at,
        translation_available: state.translation_available(),
        model: state.session.as_ref().map(|s| s.model_name().to_string()),
        error: state.load_error.clone(),
    })
}

/// Supported languages handler
async fn get_languages() -> axum::Json<LanguagesResponse> {
    axum::Json(LanguagesResponse {
        source: SOURCE_LANG.to_string(),
        targets: TargetLanguage::ALL
            .iter()
            .map(|lang| LanguageInfo {
                code: lang.code().to_string(),
                label: lang.label().to_string(),
            })
            .collect(),
        max_new_tokens: TokenBounds {
            min: MIN_NEW_TOKENS,
            max: MAX_NEW_TOKENS,
            step: NEW_TOKENS_STEP,
            default: DEFAULT_NEW_TOKENS,
        },
    })
}

/// Translation handler
async fn translate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TranslateRequest>,
) -> std::result::Result<axum::Json<TranslateResponse>, ApiError> {
    let Some(session) = state.session.clone() else {
        let reason = state
            .load_error
            .clone()
            .unwrap_or_else(|| "model is not loaded".to_string());
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Translation is disabled: {}", reason),
            "translation_disabled",
        ));
    };

    let target_lang: TargetLanguage = payload.target_lang.parse()?;
    let request = TranslationRequest::new(payload.text, target_lang)
        .with_max_new_tokens(payload.max_new_tokens.unwrap_or(session.config().max_new_tokens));
    request.validate()?;

    // One inference at a time per engine
    let guard = state.in_flight.clone().lock_owned().await;

    let model = session.model_name().to_string();
    // Held until inference returns, even if the client goes away first
    let translation = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        session.translate(&request)
    })
    .await
    .map_err(|e| TranslationError::InternalError(e.to_string()))??;

    info!("Translated {} chars to {}", translation.chars().count(), target_lang);

    Ok(axum::Json(TranslateResponse {
        translation,
        target_lang,
        model,
    }))
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/api/languages", get(get_languages))
        .route("/api/translate", post(translate))
        .with_state(Arc::new(state))
}

/// Run the HTTP server
pub async fn run_server(host: String, port: u16, config: TranslatorConfig) -> anyhow::Result<()> {
    // A failed load keeps the server up with translation disabled
    let state = AppState::from_load_result(TranslationSession::load(config).await);

    let app = router(state);

    // Bind address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head>
<meta charset="utf-8">
<title>JA Translator (Offline)</title>
<style>
  body { font-family: sans-serif; max-width: 760px; margin: 2rem auto; padding: 0 1rem; }
  textarea { width: 100%; height: 180px; font-family: Consolas, monospace; }
  .row { margin: 0.8rem 0; }
  .error { color: #b00020; }
  .muted { color: #666; font-size: 0.9rem; }
</style>
</head>
<body>
<h1>Japanese → Vietnamese / English</h1>
<p class="muted">Model: M2M-100 418M, running locally</p>
<p id="status" class="muted"></p>
<form id="form">
  <div class="row">
    <label>Target language
      <select id="target">
        <option value="vi">Vietnamese (vi)</option>
        <option value="en">English (en)</option>
      </select>
    </label>
  </div>
  <div class="row">
    <textarea id="text" placeholder="例: この製品は炭素鋼SS400を使用しています。"></textarea>
  </div>
  <div class="row">
    <label>Max output tokens: <span id="tokens-value">256</span>
      <input id="tokens" type="range" min="32" max="512" step="32" value="256">
    </label>
  </div>
  <button id="submit" type="submit" disabled>Translate</button>
</form>
<div class="row">
  <h3>Translation</h3>
  <textarea id="output" readonly></textarea>
</div>
<script>
const $ = (id) => document.getElementById(id);
let available = false;

$("tokens").addEventListener("input", () => { $("tokens-value").textContent = $("tokens").value; });

fetch("/health").then((r) => r.json()).then((health) => {
  available = health.translation_available;
  $("submit").disabled = !available;
  $("status").textContent = available
    ? "Model ready: " + health.model
    : "Translation disabled: " + (health.error || "model not loaded");
  $("status").className = available ? "muted" : "error";
});

$("form").addEventListener("submit", async (event) => {
  event.preventDefault();
  const text = $("text").value;
  if (!text.trim()) {
    $("status").textContent = "Enter text to translate.";
    return;
  }
  $("submit").disabled = true;
  $("status").textContent = "Translating...";
  try {
    const response = await fetch("/api/translate", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({
        text: text,
        target_lang: $("target").value,
        max_new_tokens: Number($("tokens").value),
      }),
    });
    const body = await response.json();
    if (response.ok) {
      $("output").value = body.translation;
      $("status").textContent = "Done (" + body.target_lang + ")";
      $("status").className = "muted";
    } else {
      $("status").textContent = body.error.message;
      $("status").className = "error";
    }
  } catch (err) {
    $("status").textContent = String(err);
    $("status").className = "error";
  } finally {
    $("submit").disabled = !available;
  }
});
</script>
</body>
</html>
"#;
