use axum::{
    Form, Json,
    extract::{
        State,
        rejection::{FormRejection, JsonRejection},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};
use crate::extractors::{ApiKey, ClientIp};
use crate::metrics::{DIAGRAM_LATENCY, RATE_LIMITED_TOTAL, REQUEST_TOTAL, UPSTREAM_FAILURES, VALIDATION_FAILURES};
use crate::models::{DiagramForm, DiagramPayload, DiagramRequest};
use crate::rate_limit::RateLimitKey;
use crate::security::{create_rate_limit_key, hash_api_key, validate_api_key};
use crate::state::AppState;
use crate::validation::{ValidationError, validate_form, validate_payload};

// Who is asking, once the credential and rate limit checks passed
struct Caller {
    key: RateLimitKey,
}

impl Caller {
    fn key_hash(&self) -> &str {
        &self.key.api_key_hash
    }

    fn ip(&self) -> &str {
        &self.key.client_ip
    }
}

// Whole seconds until `reset`, rounded up, at least 1
pub fn retry_after_secs(reset: Instant, now: Instant) -> u64 {
    let wait: Duration = reset.saturating_duration_since(now);
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

// Credential format check, then rate limit. Runs before any body parsing.
fn admit(state: &AppState, api_key: &str, client_ip: &str) -> Result<Caller> {
    if !validate_api_key(api_key) {
        tracing::warn!("Invalid API key format from IP: {}", client_ip);
        return Err(AppError::InvalidApiKey("Invalid API key format".to_string()));
    }

    let api_key_hash = hash_api_key(api_key, state.api_key_hash_length);
    let key = create_rate_limit_key(&api_key_hash, client_ip);

    if !state.rate_limiter.is_allowed(&key) {
        RATE_LIMITED_TOTAL.inc();
        let reset = state.rate_limiter.get_reset_time(&key);
        return Err(AppError::RateLimitExceeded {
            retry_after_secs: retry_after_secs(reset, Instant::now()),
        });
    }

    Ok(Caller { key })
}

fn rejected(caller: &Caller, formulas: &[String], err: ValidationError) -> AppError {
    VALIDATION_FAILURES.inc();
    tracing::warn!(
        "Validation failed: {} (formulas={:?}, key_hash={}, IP={})",
        err,
        formulas,
        caller.key_hash(),
        caller.ip()
    );
    err.into()
}

async fn generate(
    state: &AppState,
    api_key: &str,
    caller: &Caller,
    request: DiagramRequest,
) -> Result<Response> {
    tracing::info!(
        "API Request: formulas={:?}, T={}K, e_cut={}, functional={}, key_hash={}, IP={}",
        request.formulas,
        request.temperature,
        request.energy_cutoff,
        request.functional,
        caller.key_hash(),
        caller.ip()
    );

    let start_time = Instant::now();

    let response = match state.analyzer.generate(&request, api_key).await {
        Ok(response) => response,
        Err(e) => {
            UPSTREAM_FAILURES.inc();
            let err = AppError::from(e);
            if matches!(err, AppError::Internal(_)) {
                tracing::error!(
                    "Server error: {} (formulas={:?}, T={}K, e_cut={}, functional={}, key_hash={}, IP={})",
                    err,
                    request.formulas,
                    request.temperature,
                    request.energy_cutoff,
                    request.functional,
                    caller.key_hash(),
                    caller.ip()
                );
            } else {
                tracing::warn!(
                    "Client error: {} (formulas={:?}, key_hash={}, IP={})",
                    err,
                    request.formulas,
                    caller.key_hash(),
                    caller.ip()
                );
            }
            return Err(err);
        }
    };

    DIAGRAM_LATENCY.observe(start_time.elapsed().as_secs_f64());
    tracing::info!("Diagram generated successfully: {} phases", response.phase_info.len());

    let remaining = state.rate_limiter.get_remaining_requests(&caller.key);
    let headers = [
        ("x-ratelimit-limit", state.rate_limiter.max_requests().to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
    ];
    Ok((headers, Json(response)).into_response())
}

/// `POST /api/diagrams` with a JSON body `{f, temp, e_cut, functional}`.
pub async fn diagram_handler(
    State(state): State<Arc<AppState>>,
    ApiKey(api_key): ApiKey,
    ClientIp(client_ip): ClientIp,
    payload: std::result::Result<Json<DiagramPayload>, JsonRejection>,
) -> Result<Response> {
    REQUEST_TOTAL.inc();
    let caller = admit(&state, &api_key, &client_ip)?;

    let Json(payload) = payload.map_err(|rejection| {
        VALIDATION_FAILURES.inc();
        AppError::from(rejection)
    })?;
    let formulas = payload.f.clone();
    let request = validate_payload(payload, &state.limits)
        .map_err(|e| rejected(&caller, &formulas, e))?;

    generate(&state, &api_key, &caller, request).await
}

/// `POST /api/diagrams/form`, the urlencoded form equivalent. Formulas are
/// comma separated and every field arrives as text.
pub async fn diagram_form_handler(
    State(state): State<Arc<AppState>>,
    ApiKey(api_key): ApiKey,
    ClientIp(client_ip): ClientIp,
    form: std::result::Result<Form<DiagramForm>, FormRejection>,
) -> Result<Response> {
    REQUEST_TOTAL.inc();
    let caller = admit(&state, &api_key, &client_ip)?;

    let Form(form) = form.map_err(|rejection| {
        VALIDATION_FAILURES.inc();
        AppError::from(rejection)
    })?;
    let formulas = vec![form.formulas.clone()];
    let request = validate_form(form, &state.limits)
        .map_err(|e| rejected(&caller, &formulas, e))?;

    generate(&state, &api_key, &caller, request).await
}
