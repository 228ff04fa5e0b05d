use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lnurld_shared::lnurl::{encode_lnurl, StatusResponse};
use lnurld_shared::{Account, AccountSummary, Event, PaymentHash, PrizeWinner, Raffle, RaffleTicket, ZapRequest};
use lnurld_store::RecordStore;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::accounts::AccountService;
use crate::auth::{AuthenticationService, ConsoleSessions};
use crate::cache::Clock;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::events::{EventDetails, EventService};
use crate::invoices::InvoiceGateway;
use crate::node::PaymentNode;
use crate::raffle::{RaffleEngine, RaffleStatus};
use crate::withdrawal::WithdrawalService;
use crate::zap::{spawn_settlement_watcher, ReceiptPublisher};

const ZAP_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub sessions: Arc<ConsoleSessions>,
    pub auth: Arc<AuthenticationService>,
    pub invoices: Arc<InvoiceGateway>,
    pub withdrawals: Arc<WithdrawalService>,
    pub raffles: Arc<RaffleEngine>,
    pub events: Arc<EventService>,
    pub accounts: Arc<AccountService>,
    pub publisher: Option<Arc<dyn ReceiptPublisher>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        accounts: BTreeMap<String, Account>,
        store: Arc<RecordStore>,
        node: Arc<dyn PaymentNode>,
        publisher: Option<Arc<dyn ReceiptPublisher>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let invoices = Arc::new(InvoiceGateway::new(
            node,
            config.invoice_cache_capacity,
            config.invoice_expiry_secs,
            clock.clone(),
        ));
        let auth = Arc::new(AuthenticationService::new(
            Duration::from_secs(config.auth_request_expiry_secs),
            clock.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalService::new(
            store.clone(),
            invoices.clone(),
            config.withdrawal_fee_percent,
            Duration::from_secs(config.withdrawal_request_expiry_secs),
            clock,
        ));
        let raffles = Arc::new(RaffleEngine::new(
            store.clone(),
            invoices.clone(),
            withdrawals.clone(),
        ));
        let accounts = Arc::new(AccountService::new(accounts, store.clone(), invoices.clone()));
        let events = Arc::new(EventService::new(store, auth.clone()));

        Self {
            sessions: Arc::new(ConsoleSessions::new(&config.console_credentials)),
            config: Arc::new(config),
            auth,
            invoices,
            withdrawals,
            raffles,
            events,
            accounts,
            publisher,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.public_url, path)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // LNURL
        .route("/ln/auth", get(auth_challenge))
        .route("/ln/auth/verify", get(auth_verify))
        .route("/ln/auth/:k1", get(auth_identity))
        .route("/ln/raffles/:id/pay", get(raffle_pay))
        .route("/ln/withdraw/:k1", get(withdraw_request))
        .route("/ln/withdraw/:k1/callback", get(withdraw_callback))
        .route("/ln/invoices/:payment_hash", get(invoice_status))
        .route("/.well-known/lnurlp/:name", get(account_pay))
        .route("/ln/pay/:name", get(account_pay))
        // events
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", get(event_details))
        .route("/events/:id/ical", get(event_ical))
        .route("/events/:id/attendees", post(event_sign_up))
        // console
        .route("/console/login", post(console_login))
        .route("/accounts", get(list_accounts))
        .route("/accounts/:name", get(account_summary))
        .route("/raffles", get(list_raffles).post(create_raffle))
        .route("/raffles/:id", get(raffle_details))
        .route("/raffles/:id/draw", post(raffle_draw))
        .route("/raffles/:id/commit", post(raffle_commit))
        .route("/raffles/:id/lock", post(raffle_lock))
        .route("/raffles/:id/withdraw", post(raffle_withdraw))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// LNURL-auth
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AuthChallengeResponse {
    k1: String,
    lnurl: String,
}

#[derive(Deserialize)]
struct AuthVerifyQuery {
    k1: String,
    sig: String,
    key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    identity: String,
    public_id: String,
}

async fn auth_challenge(State(state): State<AppState>) -> Result<Json<AuthChallengeResponse>, ServerError> {
    let k1 = state.auth.generate_challenge().await;
    let lnurl = encode_lnurl(&state.url(&format!("/ln/auth/verify?tag=login&k1={k1}&action=login")))?;
    Ok(Json(AuthChallengeResponse { k1, lnurl }))
}

async fn auth_verify(
    State(state): State<AppState>,
    Query(query): Query<AuthVerifyQuery>,
) -> Result<Json<StatusResponse>, ServerError> {
    state
        .auth
        .verify_challenge(&query.k1, &query.sig, &query.key)
        .await?;
    Ok(Json(StatusResponse::ok()))
}

async fn auth_identity(
    State(state): State<AppState>,
    Path(k1): Path<String>,
) -> Result<Json<IdentityResponse>, ServerError> {
    let identity = state
        .auth
        .get_identity(&k1)
        .await
        .ok_or_else(|| ServerError::NotFound("verified challenge".into()))?;
    Ok(Json(IdentityResponse {
        public_id: identity.public_id(),
        identity: identity.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// LNURL-pay (raffle tickets)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PayQuery {
    amount: Option<i64>,
    nostr: Option<String>,
}

async fn raffle_pay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PayQuery>,
) -> Result<Response, ServerError> {
    let Some(amount) = query.amount else {
        let raffle = state.raffles.get_raffle(&id).await?;
        let callback = state.url(&format!("/ln/raffles/{id}/pay"));
        let nostr_pubkey = state.publisher.as_ref().map(|p| p.public_key());
        return Ok(Json(state.raffles.pay_params(&raffle, callback, nostr_pubkey)).into_response());
    };

    let zap = match (&query.nostr, &state.publisher) {
        (Some(raw), Some(_)) => Some(ZapRequest::parse(raw, amount)?),
        (Some(_), None) => return Err(ServerError::BadRequest("zaps are not supported".into())),
        (None, _) => None,
    };

    let sale = state.raffles.issue_tickets(&id, amount, zap.as_ref()).await?;

    if let (Some(zap), Some(publisher)) = (zap, &state.publisher) {
        spawn_settlement_watcher(
            state.invoices.clone(),
            publisher.clone(),
            zap,
            sale.invoice.payment_hash,
            ZAP_POLL_INTERVAL,
            Duration::from_secs(state.invoices.expiry_secs()),
        );
    }

    Ok(Json(sale.pay_values).into_response())
}

// ---------------------------------------------------------------------------
// LNURL-pay (Lightning Address accounts)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AccountPayQuery {
    amount: Option<i64>,
    #[serde(default)]
    comment: String,
}

async fn account_pay(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<AccountPayQuery>,
) -> Result<Response, ServerError> {
    let host = state.config.public_host();
    let Some(amount) = query.amount else {
        let callback = state.url(&format!("/ln/pay/{name}"));
        return Ok(Json(state.accounts.pay_params(&name, callback, host)?).into_response());
    };
    let values = state
        .accounts
        .issue_invoice(&name, amount, &query.comment, host)
        .await?;
    Ok(Json(values).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceStatusResponse {
    payment_hash: PaymentHash,
    settled: bool,
}

async fn invoice_status(
    State(state): State<AppState>,
    Path(payment_hash): Path<String>,
) -> Result<Json<InvoiceStatusResponse>, ServerError> {
    let payment_hash = PaymentHash::from_hex(&payment_hash)?;
    let settled = state.invoices.is_settled(&payment_hash).await?;
    Ok(Json(InvoiceStatusResponse {
        payment_hash,
        settled,
    }))
}

// ---------------------------------------------------------------------------
// LNURL-withdraw
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WithdrawCallbackQuery {
    pr: String,
}

async fn withdraw_request(
    State(state): State<AppState>,
    Path(k1): Path<String>,
) -> Result<Response, ServerError> {
    let callback = state.url(&format!("/ln/withdraw/{k1}/callback"));
    let params = state.withdrawals.withdraw_params(&k1, callback).await?;
    Ok(Json(params).into_response())
}

async fn withdraw_callback(
    State(state): State<AppState>,
    Path(k1): Path<String>,
    Query(query): Query<WithdrawCallbackQuery>,
) -> Result<Json<StatusResponse>, ServerError> {
    state.withdrawals.redeem(&k1, &query.pr).await?;
    Ok(Json(StatusResponse::ok()))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SignUpRequest {
    k1: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    public_id: String,
}

async fn event_details(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventDetails>, ServerError> {
    Ok(Json(state.events.details(&id).await?))
}

async fn event_ical(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let event = state.events.get_event(&id).await?;
    let body = event.to_icalendar(state.config.public_host(), chrono::Utc::now());
    Ok((
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        body,
    )
        .into_response())
}

async fn event_sign_up(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SignUpRequest>,
) -> Result<Json<SignUpResponse>, ServerError> {
    let public_id = state
        .events
        .sign_up(&id, &request.k1, chrono::Utc::now())
        .await?;
    Ok(Json(SignUpResponse { public_id }))
}

async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Event>>, ServerError> {
    console_user(&headers, &state)?;
    Ok(Json(state.events.list_events().await?))
}

async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<Event>,
) -> Result<Json<Event>, ServerError> {
    let user = console_user(&headers, &state)?;
    Ok(Json(state.events.create_event(&user, event).await?))
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginRequest {
    user: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
}

/// Console user behind the request's bearer token.
fn console_user(headers: &HeaderMap, state: &AppState) -> Result<String, ServerError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    state.sessions.get_user(token).ok_or(ServerError::Unauthorized)
}

async fn console_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    if !state
        .sessions
        .verify_credentials(&request.user, &request.password)
    {
        return Err(ServerError::Unauthorized);
    }
    let token = state
        .sessions
        .get_token(&request.user)
        .ok_or(ServerError::Unauthorized)?
        .to_string();
    info!(user = %request.user, "Console login");
    Ok(Json(LoginResponse { token }))
}

#[derive(Serialize)]
struct RaffleDetails {
    raffle: Raffle,
    status: RaffleStatus,
    lnurl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    winners: Option<Vec<PrizeWinner>>,
}

#[derive(Serialize)]
struct DrawnTicket {
    ticket: RaffleTicket,
    number: String,
}

#[derive(Deserialize)]
struct CommitRequest {
    #[serde(default)]
    skipped: Vec<RaffleTicket>,
}

#[derive(Serialize)]
struct WithdrawResponse {
    k1: String,
    lnurl: String,
}

async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<String>>, ServerError> {
    let user = console_user(&headers, &state)?;
    Ok(Json(state.accounts.list_accounts(&user)))
}

async fn account_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<AccountSummary>, ServerError> {
    let user = console_user(&headers, &state)?;
    Ok(Json(state.accounts.summary(&name, &user).await?))
}

async fn owned_raffle(state: &AppState, id: &str, user: &str) -> Result<Raffle, ServerError> {
    let raffle = state.raffles.get_raffle(id).await?;
    if raffle.owner != user {
        return Err(ServerError::Forbidden(format!("raffle {id} belongs to another user")));
    }
    Ok(raffle)
}

async fn create_raffle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(raffle): Json<Raffle>,
) -> Result<Json<Raffle>, ServerError> {
    let user = console_user(&headers, &state)?;
    Ok(Json(state.raffles.create_raffle(&user, raffle).await?))
}

async fn list_raffles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Raffle>>, ServerError> {
    let user = console_user(&headers, &state)?;
    Ok(Json(state.raffles.list_raffles(&user).await?))
}

async fn raffle_details(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<RaffleDetails>, ServerError> {
    console_user(&headers, &state)?;
    let raffle = state.raffles.get_raffle(&id).await?;
    Ok(Json(RaffleDetails {
        status: state.raffles.status(&id).await?,
        lnurl: encode_lnurl(&state.url(&format!("/ln/raffles/{id}/pay")))?,
        winners: state.raffles.winners(&id).await?,
        raffle,
    }))
}

async fn raffle_draw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<DrawnTicket>>, ServerError> {
    let user = console_user(&headers, &state)?;
    owned_raffle(&state, &id, &user).await?;
    let order = state.raffles.draw(&id).await?;
    Ok(Json(
        order
            .into_iter()
            .map(|ticket| DrawnTicket {
                number: ticket.number(),
                ticket,
            })
            .collect(),
    ))
}

async fn raffle_commit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<CommitRequest>,
) -> Result<Json<Vec<PrizeWinner>>, ServerError> {
    let user = console_user(&headers, &state)?;
    owned_raffle(&state, &id, &user).await?;
    Ok(Json(state.raffles.commit(&id, &request.skipped).await?))
}

async fn raffle_lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ServerError> {
    let user = console_user(&headers, &state)?;
    state.raffles.lock(&id).await?;
    info!(raffle = %id, user = %user, "Lock requested");
    Ok(Json(StatusResponse::ok()))
}

async fn raffle_withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<WithdrawResponse>, ServerError> {
    let user = console_user(&headers, &state)?;
    owned_raffle(&state, &id, &user).await?;
    let k1 = state.raffles.withdraw(&id).await?;
    let lnurl = encode_lnurl(&state.url(&format!("/ln/withdraw/{k1}")))?;
    Ok(Json(WithdrawResponse { k1, lnurl }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
