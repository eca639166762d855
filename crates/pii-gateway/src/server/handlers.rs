//! Axum request handlers for all service endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::protocol::{
    ErrorResponse, FieldBatchRequest, FieldBatchResponse, HashRequest, HashResponse,
    HealthResponse, MaskKind, MaskRequest, MaskResponse, RecordBody, RecordDecryptQuery,
    RedactBody,
};
use common::ServiceError;
use fieldcrypt::{mask, record, redact, ReadMode, RecordPolicy};

use super::error::ApiError;
use super::middleware::KeyServiceCtx;
use super::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Split batch items into parallel value and context slices.
fn split_items(req: &FieldBatchRequest) -> (Vec<&str>, Vec<&str>) {
    req.items
        .iter()
        .map(|item| (item.value.as_str(), item.context.as_deref().unwrap_or_default()))
        .unzip()
}

/// `POST /v1/encrypt`: encrypt a batch of values, one envelope per item.
pub async fn encrypt(
    State(state): State<AppState>,
    KeyServiceCtx(ctx): KeyServiceCtx,
    Json(req): Json<FieldBatchRequest>,
) -> ApiResult<FieldBatchResponse> {
    let (values, contexts) = split_items(&req);
    let items = state
        .encryptor
        .encrypt_batch(&ctx, &values, Some(&contexts))
        .await?;
    Ok(Json(FieldBatchResponse { items }))
}

/// `POST /v1/decrypt`: verify and decrypt a batch of envelopes.
///
/// All-or-nothing: one bad envelope fails the whole request.
pub async fn decrypt(
    State(state): State<AppState>,
    KeyServiceCtx(ctx): KeyServiceCtx,
    Json(req): Json<FieldBatchRequest>,
) -> ApiResult<FieldBatchResponse> {
    let (values, contexts) = split_items(&req);
    let items = state
        .encryptor
        .decrypt_batch(&ctx, &values, Some(&contexts))
        .await?;
    Ok(Json(FieldBatchResponse { items }))
}

/// `POST /v1/hash`: search digests for exact-match lookups.
pub async fn hash(State(state): State<AppState>, Json(req): Json<HashRequest>) -> Json<HashResponse> {
    let digests = req.values.iter().map(|v| state.hasher.hash(v)).collect();
    Json(HashResponse { digests })
}

/// `POST /v1/records/:policy/encrypt`
pub async fn record_encrypt(
    State(state): State<AppState>,
    Path(name): Path<String>,
    KeyServiceCtx(ctx): KeyServiceCtx,
    Json(mut body): Json<RecordBody>,
) -> ApiResult<RecordBody> {
    let policy = lookup_policy(&state, &name)?;
    record::encrypt_record(&state.encryptor, Some(&state.hasher), policy, &mut body.record, &ctx)
        .await?;
    Ok(Json(body))
}

/// `POST /v1/records/:policy/decrypt?mode=strict|best_effort`
pub async fn record_decrypt(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<RecordDecryptQuery>,
    KeyServiceCtx(ctx): KeyServiceCtx,
    Json(mut body): Json<RecordBody>,
) -> ApiResult<RecordBody> {
    let policy = lookup_policy(&state, &name)?;
    let mode = query
        .mode
        .as_deref()
        .map(str::parse::<ReadMode>)
        .transpose()?
        .unwrap_or_default();
    record::decrypt_record(&state.encryptor, policy, &mut body.record, &ctx, mode).await?;
    Ok(Json(body))
}

/// `POST /v1/redact`: scrub PII from free text.
pub async fn redact_text(Json(body): Json<RedactBody>) -> Json<RedactBody> {
    Json(RedactBody {
        text: redact::redact(&body.text),
    })
}

/// `POST /v1/mask`: display mask for a name, phone or email.
pub async fn mask_value(Json(req): Json<MaskRequest>) -> Json<MaskResponse> {
    let masked = match req.kind {
        MaskKind::Name => mask::mask_name(&req.value),
        MaskKind::Phone => mask::mask_phone(&req.value),
        MaskKind::Email => mask::mask_email(&req.value),
    };
    Json(MaskResponse { masked })
}

/// `GET /health`: liveness check.
///
/// The gateway only starts serving once the encryptor and policies are
/// loaded, so a response always means ready.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        key_service: state.encryptor.backend().into(),
        policies_loaded: state.policies.len(),
    })
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn lookup_policy<'s>(state: &'s AppState, name: &str) -> Result<&'s RecordPolicy, ApiError> {
    state
        .policies
        .get(name)
        .ok_or_else(|| ServiceError::NotFound(format!("record policy {name:?}")).into())
}
