//! Route handlers and the wire-decoding body extractor.

use axum::body::Bytes;
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use tally_domain::constants::{GZIP_ENCODING, HASH_HEADER};
use tally_domain::{
    snapshot_records, MetricBatch, MetricKind, MetricRecord, MetricSnapshot, TallyError,
};
use tracing::{error, warn};

use super::state::AppState;

/// Error response: status from the error class, message as plain text.
#[derive(Debug)]
pub struct ApiError(pub TallyError);

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TallyError::NotFound(_) => StatusCode::NOT_FOUND,
            TallyError::Rejected(_) => StatusCode::BAD_REQUEST,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, self.0.to_string()).into_response()
    }
}

/// JSON body after the receive chain: integrity check over the raw bytes,
/// envelope decryption, then gzip inflation when `Content-Encoding: gzip`.
pub struct WireJson<T>(pub T);

impl<T> FromRequest<AppState> for WireJson<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let hash = header_str(req.headers(), HASH_HEADER).map(str::to_owned);
        let gzip = header_str(req.headers(), CONTENT_ENCODING.as_str())
            .is_some_and(|encoding| encoding.eq_ignore_ascii_case(GZIP_ENCODING));

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| TallyError::InvalidInput(format!("failed to read body: {e}")))?;

        let plaintext = state.decoder.decode(&body, hash.as_deref(), gzip)?;
        let value = serde_json::from_slice(&plaintext)
            .map_err(|e| TallyError::InvalidInput(format!("malformed JSON body: {e}")))?;
        Ok(Self(value))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `POST /updates` - apply a batch atomically; responds with the merged
/// records in request order.
pub async fn post_updates(
    State(state): State<AppState>,
    WireJson(batch): WireJson<MetricBatch>,
) -> Result<Json<MetricBatch>, ApiError> {
    let merged = state.ingestion.apply_batch(&batch).await?;
    let records =
        batch.iter().zip(merged).map(|(record, value)| value.to_record(record.id.as_str())).collect();
    Ok(Json(records))
}

/// `POST /update` - single JSON record.
pub async fn post_update_json(
    State(state): State<AppState>,
    WireJson(record): WireJson<MetricRecord>,
) -> Result<Json<MetricRecord>, ApiError> {
    let value = state.ingestion.apply_record(&record).await?;
    Ok(Json(value.to_record(record.id)))
}

/// `POST /update/{kind}/{name}/{value}` - plain-text update.
pub async fn post_update_plain(
    State(state): State<AppState>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    let record = match MetricKind::parse(&kind)? {
        MetricKind::Counter => {
            let delta = raw
                .parse::<i64>()
                .map_err(|_| TallyError::InvalidInput(format!("'{raw}' is not a counter delta")))?;
            MetricRecord::counter(name, delta)
        }
        MetricKind::Gauge => {
            let value = raw
                .parse::<f64>()
                .map_err(|_| TallyError::InvalidInput(format!("'{raw}' is not a gauge value")))?;
            MetricRecord::gauge(name, value)
        }
    };

    state.ingestion.apply_record(&record).await?;
    Ok(StatusCode::OK)
}

/// `GET /value/{kind}/{name}` - rendered value as plain text.
pub async fn get_value(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let not_found = || ApiError(TallyError::NotFound(format!("{kind} '{name}'")));

    let kind = MetricKind::parse(&kind).map_err(|_| not_found())?;
    match state.store().get_metric(&name).await? {
        Some(value) if value.kind() == kind => Ok(value.render()),
        _ => Err(not_found()),
    }
}

/// `POST /value` - JSON query `{id, type}`.
pub async fn post_value(
    State(state): State<AppState>,
    WireJson(query): WireJson<MetricRecord>,
) -> Result<Json<MetricRecord>, ApiError> {
    match state.store().get_metric(&query.id).await? {
        Some(value) if value.kind() == query.kind => Ok(Json(value.to_record(query.id))),
        _ => Err(ApiError(TallyError::NotFound(format!("{} '{}'", query.kind, query.id)))),
    }
}

/// `GET /` - every metric keyed by name.
pub async fn get_root(State(state): State<AppState>) -> Result<Json<MetricSnapshot>, ApiError> {
    let values = state.store().get_all().await?;
    Ok(Json(snapshot_records(&values)))
}

/// `GET /ping` - backend health.
pub async fn ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.store().health_check().await?;
    Ok("OK")
}
