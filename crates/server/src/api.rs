//! JSON API over the front desk.
//!
//! Owner-side endpoints (keyed by the owner's chat identity):
//! - `POST   /api/v1/owners`                                 register a provider
//! - `DELETE /api/v1/owners/{owner_id}`                      unregister
//! - `POST   /api/v1/owners/{owner_id}/services`             add a service
//! - `GET    /api/v1/owners/{owner_id}/services`             list services
//! - `GET    /api/v1/owners/{owner_id}/queue`                view the line (`?walk_ins_only=true`)
//! - `POST   /api/v1/owners/{owner_id}/queue/next`           call the next client
//! - `DELETE /api/v1/owners/{owner_id}/queue`                clear the line
//! - `POST   /api/v1/owners/{owner_id}/busy-blocks`          block a slot
//! - `GET    /api/v1/owners/{owner_id}/busy-blocks`          list blocked slots
//! - `DELETE /api/v1/owners/{owner_id}/busy-blocks/{id}`     unblock a slot
//! - `POST   /api/v1/owners/{owner_id}/intake`               step the conversational intake
//!
//! Client-side endpoints:
//! - `GET    /api/v1/referrals/{code}`                       provider card for a referral link
//! - `GET    /api/v1/providers/{provider_id}/dates`          bookable dates from today
//! - `GET    /api/v1/providers/{provider_id}/slots?date=`    free slots on a date
//! - `POST   /api/v1/providers/{provider_id}/walk-ins`       join the live line
//! - `POST   /api/v1/providers/{provider_id}/bookings`       book a slot

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use lineup_core::domain::slot::parse_date;
use lineup_core::flows::{IntakeAction, IntakeTransitionError};
use lineup_core::{
    ApplicationError, Booking, BusyBlock, BusyBlockId, ClientId, DispatchOutcome, DomainError,
    IntakeEvent, IntakeKind, IntakeResult, IntakeSessions, IntakeState, InterfaceError, OwnerId,
    Provider, ProviderCard, ProviderId, QueueListing, Service, ServiceId, Slot, SlotTime,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bootstrap::Desk;

#[derive(Clone)]
pub struct ApiState {
    desk: Arc<Desk>,
    intake: Arc<IntakeSessions>,
}

impl ApiState {
    pub fn new(desk: Arc<Desk>, intake: Arc<IntakeSessions>) -> Self {
        Self { desk, intake }
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub owner_id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceAdded {
    pub added: bool,
    pub services: Vec<Service>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub walk_ins_only: bool,
}

#[derive(Debug, Serialize)]
pub struct CallNextResponse {
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct Removed<T> {
    pub removed: T,
}

#[derive(Debug, Deserialize)]
pub struct SlotRequest {
    pub date: String,
    pub time: String,
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: String,
}

#[derive(Debug, Serialize)]
pub struct SlotsResponse {
    pub date: NaiveDate,
    pub slots: Vec<SlotTime>,
}

#[derive(Debug, Deserialize)]
pub struct WalkInRequest {
    pub client_id: i64,
    pub service_id: i64,
}

#[derive(Debug, Serialize)]
pub struct WalkInResponse {
    pub position: u32,
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub client_id: i64,
    pub service_id: i64,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IntakeRequest {
    Begin { kind: IntakeKind },
    Input { text: String },
    Cancel,
}

impl From<IntakeRequest> for IntakeEvent {
    fn from(request: IntakeRequest) -> Self {
        match request {
            IntakeRequest::Begin { kind } => Self::Begin(kind),
            IntakeRequest::Input { text } => Self::Input(text),
            IntakeRequest::Cancel => Self::Cancel,
        }
    }
}

/// What a completed intake changed.
#[derive(Debug, Serialize)]
#[serde(tag = "applied", rename_all = "snake_case")]
pub enum IntakeApplied {
    ProviderRegistered { provider: Provider },
    ServiceAdded { name: String, added: bool },
    BusyBlockAdded { block: BusyBlock },
}

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub state: IntakeState,
    #[serde(flatten)]
    pub action: IntakeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<IntakeApplied>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn invalid_input(message: impl Into<String>) -> Self {
        ApplicationError::from(DomainError::InvalidInput(message.into())).into()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into_interface(Uuid::new_v4().to_string()))
    }
}

impl From<IntakeTransitionError> for ApiError {
    fn from(error: IntakeTransitionError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        Self(match error {
            IntakeTransitionError::InvalidTransition { .. } => InterfaceError::BadRequest {
                message: "no intake is in progress; begin one first".to_string(),
                correlation_id,
            },
            IntakeTransitionError::SessionsUnavailable => {
                InterfaceError::Internal { message: error.to_string(), correlation_id }
            }
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", message.clone())
            }
            InterfaceError::NotFound { message, .. } => {
                (StatusCode::NOT_FOUND, "not_found", message.clone())
            }
            InterfaceError::Conflict { message, .. } => {
                (StatusCode::CONFLICT, "conflict", message.clone())
            }
            InterfaceError::ServiceUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                self.0.user_message().to_string(),
            ),
            InterfaceError::Internal { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                self.0.user_message().to_string(),
            ),
        };
        let correlation_id = self.0.correlation_id().to_string();

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %self.0,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %self.0,
                "request rejected"
            );
        }

        (status, Json(ErrorBody { error: code.to_string(), message, correlation_id }))
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn slot_from(date: &str, time: &str) -> ApiResult<Slot> {
    Slot::parse(date, time).map_err(|error| ApiError::invalid_input(error.to_string()))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/owners", post(register_owner))
        .route("/api/v1/owners/{owner_id}", delete(unregister_owner))
        .route("/api/v1/owners/{owner_id}/services", get(list_services).post(add_service))
        .route("/api/v1/owners/{owner_id}/queue", get(list_queue).delete(clear_queue))
        .route("/api/v1/owners/{owner_id}/queue/next", post(call_next))
        .route(
            "/api/v1/owners/{owner_id}/busy-blocks",
            get(list_busy_blocks).post(add_busy_block),
        )
        .route("/api/v1/owners/{owner_id}/busy-blocks/{block_id}", delete(remove_busy_block))
        .route("/api/v1/owners/{owner_id}/intake", post(step_intake))
        .route("/api/v1/referrals/{code}", get(referral))
        .route("/api/v1/providers/{provider_id}/dates", get(upcoming_dates))
        .route("/api/v1/providers/{provider_id}/slots", get(available_slots))
        .route("/api/v1/providers/{provider_id}/walk-ins", post(enqueue_walk_in))
        .route("/api/v1/providers/{provider_id}/bookings", post(enqueue_booking))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Owner handlers
// ---------------------------------------------------------------------------

async fn register_owner(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<Provider>)> {
    let provider = state.desk.register_provider(OwnerId(body.owner_id), &body.name).await?;
    Ok((StatusCode::CREATED, Json(provider)))
}

async fn unregister_owner(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
) -> ApiResult<Json<Provider>> {
    Ok(Json(state.desk.unregister(OwnerId(owner_id)).await?))
}

async fn add_service(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
    Json(body): Json<ServiceRequest>,
) -> ApiResult<Json<ServiceAdded>> {
    let owner_id = OwnerId(owner_id);
    let added = state.desk.add_service(owner_id, &body.name).await?;
    let services = state.desk.list_services(owner_id).await?;
    Ok(Json(ServiceAdded { added, services }))
}

async fn list_services(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.desk.list_services(OwnerId(owner_id)).await?))
}

async fn list_queue(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<Vec<QueueListing>>> {
    Ok(Json(state.desk.queue(OwnerId(owner_id), query.walk_ins_only).await?))
}

async fn call_next(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
) -> ApiResult<Json<CallNextResponse>> {
    let outcome = state.desk.call_next(OwnerId(owner_id)).await?;
    let summary = outcome.summary();
    Ok(Json(CallNextResponse { outcome, summary }))
}

async fn clear_queue(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
) -> ApiResult<Json<Removed<u64>>> {
    let removed = state.desk.clear_queue(OwnerId(owner_id)).await?;
    Ok(Json(Removed { removed }))
}

async fn add_busy_block(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
    Json(body): Json<SlotRequest>,
) -> ApiResult<(StatusCode, Json<BusyBlock>)> {
    let slot = slot_from(&body.date, &body.time)?;
    let block = state.desk.add_busy_block(OwnerId(owner_id), slot).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn list_busy_blocks(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
) -> ApiResult<Json<Vec<BusyBlock>>> {
    Ok(Json(state.desk.list_busy_blocks(OwnerId(owner_id)).await?))
}

async fn remove_busy_block(
    State(state): State<ApiState>,
    Path((owner_id, block_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Removed<bool>>> {
    let removed = state.desk.remove_busy_block(OwnerId(owner_id), BusyBlockId(block_id)).await?;
    Ok(Json(Removed { removed }))
}

async fn step_intake(
    State(state): State<ApiState>,
    Path(owner_id): Path<i64>,
    Json(body): Json<IntakeRequest>,
) -> ApiResult<Json<IntakeResponse>> {
    let owner_id = OwnerId(owner_id);
    let outcome = state.intake.apply(owner_id.0, body.into())?;

    let result = match outcome.completed() {
        Some(completed) => Some(apply_intake(&state.desk, owner_id, completed.clone()).await?),
        None => None,
    };

    Ok(Json(IntakeResponse { state: outcome.to, action: outcome.action, result }))
}

async fn apply_intake(
    desk: &Desk,
    owner_id: OwnerId,
    completed: IntakeResult,
) -> ApiResult<IntakeApplied> {
    let applied = match completed {
        IntakeResult::ProviderName { name } => {
            let provider = desk.register_provider(owner_id, &name).await?;
            IntakeApplied::ProviderRegistered { provider }
        }
        IntakeResult::ServiceName { name } => {
            let added = desk.add_service(owner_id, &name).await?;
            IntakeApplied::ServiceAdded { name, added }
        }
        IntakeResult::BusyBlock { slot } => {
            IntakeApplied::BusyBlockAdded { block: desk.add_busy_block(owner_id, slot).await? }
        }
    };
    info!(event_name = "intake.completed", owner_id = owner_id.0, "intake result applied");
    Ok(applied)
}

// ---------------------------------------------------------------------------
// Client handlers
// ---------------------------------------------------------------------------

async fn referral(
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult<Json<ProviderCard>> {
    Ok(Json(state.desk.referral(&code).await?))
}

async fn upcoming_dates(
    State(state): State<ApiState>,
    Path(provider_id): Path<i64>,
) -> ApiResult<Json<DatesResponse>> {
    let today = Local::now().date_naive();
    let dates = state.desk.upcoming_dates(ProviderId(provider_id), today).await?;
    Ok(Json(DatesResponse { dates }))
}

async fn available_slots(
    State(state): State<ApiState>,
    Path(provider_id): Path<i64>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<Json<SlotsResponse>> {
    let date = parse_date(&query.date).map_err(|error| ApiError::invalid_input(error.to_string()))?;
    let slots = state.desk.available_slots(ProviderId(provider_id), date).await?;
    Ok(Json(SlotsResponse { date, slots }))
}

async fn enqueue_walk_in(
    State(state): State<ApiState>,
    Path(provider_id): Path<i64>,
    Json(body): Json<WalkInRequest>,
) -> ApiResult<(StatusCode, Json<WalkInResponse>)> {
    let (client_id, service_id) = (ClientId(body.client_id), ServiceId(body.service_id));
    let position =
        state.desk.enqueue_walk_in(ProviderId(provider_id), client_id, service_id).await?;
    Ok((StatusCode::CREATED, Json(WalkInResponse { position })))
}

async fn enqueue_booking(
    State(state): State<ApiState>,
    Path(provider_id): Path<i64>,
    Json(body): Json<BookingRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let slot = slot_from(&body.date, &body.time)?;
    let booking = state
        .desk
        .enqueue_scheduled(
            ProviderId(provider_id),
            ClientId(body.client_id),
            ServiceId(body.service_id),
            slot,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}
