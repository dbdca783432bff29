//! Test utilities for fleetsync-client
//!
//! [`MockStore`] is an in-process record store speaking the same protocol
//! as the real one: login/logout, read queries against registry and
//! position tables, and dataset saves. Faults can be scripted to exercise
//! session expiry, failing writes and slow logins.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use fleetsync_core::{EntityClass, StoreClock};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::Credentials;
use crate::encoding::TextEncoding;
use crate::error::Result;
use crate::protocol::{service, ResponseStatus, SaveRequest, ServiceResponse, SESSION_COOKIE};
use crate::schema::StoreSchema;
use crate::sql;
use crate::StoreClient;

/// Options for a [`MockStore`]
#[derive(Debug, Clone)]
pub struct MockStoreOptions {
    pub credentials: Credentials,
    pub schema: StoreSchema,
    /// Encoding of response bodies
    pub encoding: TextEncoding,
    /// Charset announced in `Content-Type`, when it differs from `encoding`
    pub declared_charset: Option<&'static str>,
    /// Delay before answering a login
    pub login_delay: Duration,
    /// Delay before answering any other call
    pub response_delay: Duration,
}

impl Default for MockStoreOptions {
    fn default() -> Self {
        Self {
            credentials: Credentials::new("sync", "secret"),
            schema: StoreSchema::default(),
            encoding: TextEncoding::Utf8,
            declared_charset: None,
            login_delay: Duration::ZERO,
            response_delay: Duration::ZERO,
        }
    }
}

/// A position row held by the mock store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPosition {
    pub sequence: u64,
    pub key: String,
    /// Raw value of the observed-at column
    pub observed_at: String,
    /// Every written column by name
    pub values: HashMap<String, Value>,
}

#[derive(Default)]
struct ClassData {
    registry: Vec<(String, String)>,
    positions: Vec<StoredPosition>,
}

#[derive(Default)]
struct Counters {
    logins: AtomicUsize,
    logouts: AtomicUsize,
    queries: AtomicUsize,
    saves: AtomicUsize,
}

struct MockState {
    options: MockStoreOptions,
    clock: StoreClock,
    sessions: Mutex<HashSet<String>>,
    next_token: AtomicUsize,
    next_sequence: AtomicUsize,
    data: Mutex<HashMap<EntityClass, ClassData>>,
    counters: Counters,
    failing_saves: AtomicUsize,
    failing_queries: AtomicUsize,
    reject_all_sessions: AtomicBool,
    malformed_responses: AtomicBool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceQuery {
    service_name: String,
}

/// In-process record store that shuts down when dropped
pub struct MockStore {
    pub addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockStore {
    /// Start a mock store on an ephemeral local port
    pub async fn start(options: MockStoreOptions) -> Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            options,
            clock: StoreClock::utc(),
            sessions: Mutex::new(HashSet::new()),
            next_token: AtomicUsize::new(1),
            next_sequence: AtomicUsize::new(1),
            data: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            failing_saves: AtomicUsize::new(0),
            failing_queries: AtomicUsize::new(0),
            reject_all_sessions: AtomicBool::new(false),
            malformed_responses: AtomicBool::new(false),
        });

        let router = Router::new()
            .route("/mge/service.sbr", post(handle_service))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Base URL to hand to a [`StoreClient`]
    pub fn base_url(&self) -> String {
        format!("http://{}/mge", self.addr)
    }

    /// A client using the store's own credentials
    pub fn client(&self) -> Result<StoreClient> {
        self.client_with(self.state.options.credentials.clone())
    }

    /// A client with arbitrary credentials and the store's encoding
    pub fn client_with(&self, credentials: Credentials) -> Result<StoreClient> {
        StoreClient::with_options(
            &self.base_url(),
            credentials,
            self.state.options.encoding,
            Duration::from_secs(5),
            Duration::from_secs(2),
        )
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Register an entity: `identifier` resolves to `key`
    pub fn register(&self, class: EntityClass, key: &str, identifier: &str) {
        self.state
            .data
            .lock()
            .entry(class)
            .or_default()
            .registry
            .push((key.to_string(), identifier.to_string()));
    }

    /// Seed a persisted position (raw observed-at value, may be malformed)
    pub fn seed_position(&self, class: EntityClass, key: &str, observed_at: &str) {
        let sequence = self.state.next_sequence.fetch_add(1, Ordering::SeqCst) as u64;
        self.state
            .data
            .lock()
            .entry(class)
            .or_default()
            .positions
            .push(StoredPosition {
                sequence,
                key: key.to_string(),
                observed_at: observed_at.to_string(),
                values: HashMap::new(),
            });
    }

    /// All positions held for a class, in insertion order
    pub fn positions(&self, class: EntityClass) -> Vec<StoredPosition> {
        self.state
            .data
            .lock()
            .get(&class)
            .map(|d| d.positions.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Expire every open session; the next call with an old token gets status 3
    pub fn expire_sessions(&self) {
        self.state.sessions.lock().clear();
    }

    /// Answer every authenticated call with status 3, even right after login
    pub fn reject_all_sessions(&self, reject: bool) {
        self.state
            .reject_all_sessions
            .store(reject, Ordering::SeqCst);
    }

    /// Fail the next `count` saves with a domain error
    pub fn fail_next_saves(&self, count: usize) {
        self.state.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` queries with a domain error
    pub fn fail_next_queries(&self, count: usize) {
        self.state.failing_queries.store(count, Ordering::SeqCst);
    }

    /// Answer with bodies that are not valid JSON
    pub fn malformed_responses(&self, malformed: bool) {
        self.state
            .malformed_responses
            .store(malformed, Ordering::SeqCst);
    }

    // =========================================================================
    // Counters
    // =========================================================================

    pub fn login_count(&self) -> usize {
        self.state.counters.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.state.counters.logouts.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.state.counters.queries.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.state.counters.saves.load(Ordering::SeqCst)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockStore {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_service(
    State(state): State<Arc<MockState>>,
    Query(query): Query<ServiceQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let envelope: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let payload = envelope.get("requestBody").cloned().unwrap_or(Value::Null);
    let service_name = query.service_name.as_str();

    if service_name == service::LOGIN {
        tokio::time::sleep(state.options.login_delay).await;
        return state.respond(state.login(&payload));
    }

    tokio::time::sleep(state.options.response_delay).await;

    let token = session_cookie(&headers);
    let authorized = !state.reject_all_sessions.load(Ordering::SeqCst)
        && token
            .as_ref()
            .is_some_and(|t| state.sessions.lock().contains(t));
    if !authorized {
        return state.respond(ServiceResponse::failure(
            ResponseStatus::Unauthorized,
            "Não autorizado.",
        ));
    }

    let response = match service_name {
        service::LOGOUT => {
            state.counters.logouts.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = token {
                state.sessions.lock().remove(&token);
            }
            ServiceResponse::success(Value::Null)
        }
        service::EXECUTE_QUERY => state.execute_query(&payload),
        service::SAVE => state.save(payload),
        other => ServiceResponse::failure(
            ResponseStatus::Error,
            format!("Serviço não encontrado: {}", other),
        ),
    };
    state.respond(response)
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Whether any `FROM` clause of `sql` names `table`
fn reads_from(sql: &str, table: &str) -> bool {
    let tokens: Vec<&str> = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == ',')
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(2)
        .any(|w| w[0].eq_ignore_ascii_case("FROM") && w[1].eq_ignore_ascii_case(table))
}

/// Registry keys are numeric in real stores; zero-padded codes stay text
fn numeric_or_text(key: &str) -> Value {
    match key.parse::<i64>() {
        Ok(n) if n.to_string() == key => Value::from(n),
        _ => Value::from(key),
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockState {
    fn respond(&self, response: ServiceResponse) -> Response {
        let encoding = self.options.encoding;
        let charset = self.options.declared_charset.unwrap_or(encoding.charset());
        let text = if self.malformed_responses.load(Ordering::SeqCst) {
            "<html>Internal error".to_string()
        } else {
            serde_json::to_string(&response).unwrap_or_default()
        };
        (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                format!("application/json; charset={}", charset),
            )],
            encoding.encode(&text),
        )
            .into_response()
    }

    fn login(&self, payload: &Value) -> ServiceResponse {
        self.counters.logins.fetch_add(1, Ordering::SeqCst);
        let user = payload.pointer("/NOMUSU/$").and_then(Value::as_str);
        let password = payload.pointer("/INTERNO/$").and_then(Value::as_str);
        let expected = &self.options.credentials;
        if user != Some(expected.username.as_str()) || password != Some(expected.password.as_str())
        {
            return ServiceResponse::failure(ResponseStatus::Error, "Usuário/Senha inválido.");
        }

        let token = format!(
            "mock-session-{}",
            self.next_token.fetch_add(1, Ordering::SeqCst)
        );
        self.sessions.lock().insert(token.clone());
        ServiceResponse::success(json!({ "jsessionid": { "$": token } }))
    }

    fn execute_query(&self, payload: &Value) -> ServiceResponse {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_queries) {
            return ServiceResponse::failure(ResponseStatus::Error, "ORA-12541: TNS:no listener");
        }

        let Some(sql) = payload.get("sql").and_then(Value::as_str) else {
            return ServiceResponse::failure(ResponseStatus::Error, "Consulta vazia");
        };

        let data = self.data.lock();
        for class in EntityClass::ALL {
            let schema = self.options.schema.entity(class);
            let class_data = data.get(&class);

            if reads_from(sql, &schema.position_table) {
                return self.watermark_rows(class, class_data);
            }
            if reads_from(sql, &schema.lookup_table) {
                let wanted: HashSet<String> = sql::literals(sql).into_iter().collect();
                let rows: Vec<Value> = class_data
                    .map(|d| d.registry.as_slice())
                    .unwrap_or_default()
                    .iter()
                    .filter(|(_, identifier)| wanted.contains(identifier))
                    .map(|(key, identifier)| json!([numeric_or_text(key), identifier]))
                    .collect();
                return ServiceResponse::success(json!({
                    "fieldsMetadata": [
                        { "name": schema.key_column },
                        { "name": schema.identifier_column },
                    ],
                    "rows": rows,
                }));
            }
        }

        ServiceResponse::failure(ResponseStatus::Error, "ORA-00942: table or view does not exist")
    }

    /// Latest row per key: newest observed-at, ties broken by sequence
    fn watermark_rows(&self, class: EntityClass, data: Option<&ClassData>) -> ServiceResponse {
        let schema = self.options.schema.entity(class);
        let mut latest: HashMap<&str, &StoredPosition> = HashMap::new();
        for position in data.map(|d| d.positions.as_slice()).unwrap_or_default() {
            let rank = |p: &StoredPosition| (self.clock.parse(&p.observed_at), p.sequence);
            latest
                .entry(position.key.as_str())
                .and_modify(|current| {
                    if rank(position) > rank(*current) {
                        *current = position;
                    }
                })
                .or_insert(position);
        }

        let rows: Vec<Value> = latest
            .values()
            .map(|p| json!([p.key, p.observed_at]))
            .collect();
        ServiceResponse::success(json!({
            "fieldsMetadata": [
                { "name": schema.key_column },
                { "name": schema.observed_at_column },
            ],
            "rows": rows,
        }))
    }

    fn save(&self, payload: Value) -> ServiceResponse {
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_saves) {
            return ServiceResponse::failure(
                ResponseStatus::Error,
                "Erro ao salvar registros: ORA-00060 deadlock detected",
            );
        }

        let request: SaveRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                return ServiceResponse::failure(
                    ResponseStatus::Error,
                    format!("Requisição inválida: {}", e),
                )
            }
        };
        let Some(class) = self.options.schema.class_for_entity(&request.entity_name) else {
            return ServiceResponse::failure(
                ResponseStatus::Error,
                format!("Entidade desconhecida: {}", request.entity_name),
            );
        };
        let schema = self.options.schema.entity(class);
        let Some(observed_index) = request.field_index(&schema.observed_at_column) else {
            return ServiceResponse::failure(ResponseStatus::Error, "Campo de data ausente");
        };

        // All rows or none
        let mut rows = Vec::with_capacity(request.records.len());
        for record in &request.records {
            let Some(key) = record.foreign_key.get(&schema.key_column) else {
                return ServiceResponse::failure(ResponseStatus::Error, "Chave estrangeira ausente");
            };
            let key = match key {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let observed_at = record
                .get(observed_index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let values = request
                .fields
                .iter()
                .enumerate()
                .filter_map(|(i, name)| record.get(i).map(|v| (name.clone(), v.clone())))
                .collect();
            rows.push((key, observed_at, values));
        }

        let mut data = self.data.lock();
        let class_data = data.entry(class).or_default();
        for (key, observed_at, values) in rows {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst) as u64;
            class_data.positions.push(StoredPosition {
                sequence,
                key,
                observed_at,
                values,
            });
        }

        ServiceResponse::success(json!({ "total": request.records.len() }))
    }
}
