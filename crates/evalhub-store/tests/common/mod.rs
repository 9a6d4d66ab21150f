//! Shared test harness: an in-memory backend that evaluates `Query` filters,
//! a notice recorder and a scripted checkout widget.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use evalhub_client::{
    AuthSession, AuthUser, Backend, ClientError, Direction, FilterOp, NewIdentity, OtpType,
    PaymentEndpoint, Query, SignUpOutcome, SignUpRequest,
};
use evalhub_core::{Role, UserId};
use evalhub_store::{
    CheckoutOutcome, CheckoutRequest, CheckoutWidget, IdentityStore, ManualClock,
    MemoryPersistence, Notice, NoticeLevel, Notifier, StoreConfig, StoreContext,
};

pub type Tables = HashMap<String, Vec<Value>>;
pub type RpcHandler = Arc<dyn Fn(&mut Tables, &Value) -> Result<Value, ClientError> + Send + Sync>;

// ============================================================================
// Fake backend
// ============================================================================

#[derive(Default)]
struct FakeState {
    tables: Tables,
    accounts: HashMap<String, (String, AuthUser)>,
    current_user: Option<AuthUser>,
    sign_in_error: Option<ClientError>,
    recovery_tokens: HashMap<String, AuthUser>,
    passwords_set: Vec<String>,
    rpc_handlers: HashMap<String, RpcHandler>,
    payment_responses: HashMap<&'static str, Value>,
    failing: HashMap<String, String>,
    selects: HashMap<String, usize>,
    updates: HashMap<String, usize>,
    rpc_calls: Vec<(String, Value)>,
    payments: usize,
    deleted_users: Vec<UserId>,
}

/// Backend double holding tables as JSON rows.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

fn api_error(message: impl Into<String>, status: u16) -> ClientError {
    ClientError::Api {
        code: None,
        message: message.into(),
        status,
    }
}

fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return text == pattern;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last)
    {
        return false;
    }
    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => field_text(a).cmp(&field_text(b)),
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    let filters_pass = query.filters().iter().all(|filter| {
        let field = field_text(row.get(&filter.column));
        match &filter.op {
            FilterOp::Eq(v) => field.as_deref() == Some(v.as_str()),
            FilterOp::Neq(v) => field.is_some_and(|f| &f != v),
            FilterOp::In(values) => field.is_some_and(|f| values.contains(&f)),
            FilterOp::IsNull => field.is_none(),
            FilterOp::NotNull => field.is_some(),
            FilterOp::Gte(v) => field.is_some_and(|f| f.as_str() >= v.as_str()),
            FilterOp::Ilike(p) => field.is_some_and(|f| glob_match(p, &f)),
        }
    });
    let search_passes = query.search_filter().map_or(true, |search| {
        search.columns.iter().any(|column| {
            field_text(row.get(column)).is_some_and(|f| glob_match(&search.pattern, &f))
        })
    });
    filters_pass && search_passes
}

fn now_json() -> Value {
    json!(Utc::now())
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn seed(&self, table: &str, row: Value) {
        self.state()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn patch_rows(&self, table: &str, id: impl ToString, patch: Value) {
        let id = id.to_string();
        let mut state = self.state();
        for row in state.tables.entry(table.to_string()).or_default() {
            if field_text(row.get("id")).as_deref() == Some(id.as_str()) {
                merge(row, &patch);
            }
        }
    }

    pub fn add_account(&self, email: &str, password: &str, user_id: UserId) -> AuthUser {
        let user = AuthUser {
            id: user_id,
            email: Some(email.to_string()),
            user_metadata: json!({}),
        };
        self.state()
            .accounts
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    pub fn set_current_user(&self, user: Option<AuthUser>) {
        self.state().current_user = user;
    }

    pub fn fail_sign_in(&self, err: ClientError) {
        self.state().sign_in_error = Some(err);
    }

    pub fn add_recovery_token(&self, token_hash: &str, user: AuthUser) {
        self.state()
            .recovery_tokens
            .insert(token_hash.to_string(), user);
    }

    pub fn passwords_set(&self) -> Vec<String> {
        self.state().passwords_set.clone()
    }

    pub fn on_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&mut Tables, &Value) -> Result<Value, ClientError> + Send + Sync + 'static,
    {
        self.state()
            .rpc_handlers
            .insert(name.to_string(), Arc::new(handler));
    }

    pub fn on_payment(&self, endpoint: PaymentEndpoint, response: Value) {
        self.state()
            .payment_responses
            .insert(endpoint.path(), response);
    }

    /// Make every call touching `target` fail. `target` is a table name, an
    /// RPC name, or `update:<table>` for writes only.
    pub fn fail(&self, target: &str, message: &str) {
        self.state()
            .failing
            .insert(target.to_string(), message.to_string());
    }

    pub fn heal(&self, target: &str) {
        self.state().failing.remove(target);
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub fn selects(&self, table: &str) -> usize {
        self.state().selects.get(table).copied().unwrap_or(0)
    }

    pub fn updates(&self, table: &str) -> usize {
        self.state().updates.get(table).copied().unwrap_or(0)
    }

    pub fn rpc_count(&self, name: &str) -> usize {
        self.state()
            .rpc_calls
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    pub fn rpc_params(&self, name: &str) -> Vec<Value> {
        self.state()
            .rpc_calls
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn payments(&self) -> usize {
        self.state().payments
    }

    pub fn deleted_users(&self) -> Vec<UserId> {
        self.state().deleted_users.clone()
    }

    fn check_failure(state: &FakeState, keys: &[&str]) -> Result<(), ClientError> {
        for key in keys {
            if let Some(message) = state.failing.get(*key) {
                return Err(api_error(message.clone(), 500));
            }
        }
        Ok(())
    }

    fn session(user: AuthUser) -> AuthSession {
        AuthSession {
            access_token: "token".into(),
            refresh_token: None,
            expires_in: Some(3600),
            user,
        }
    }
}

fn merge(row: &mut Value, patch: &Value) {
    if let (Some(row), Some(patch)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            row.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn current_user(&self) -> Result<Option<AuthUser>, ClientError> {
        Ok(self.state().current_user.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError> {
        let mut state = self.state();
        if let Some(err) = state.sign_in_error.take() {
            return Err(err);
        }
        match state.accounts.get(email) {
            Some((expected, user)) if expected == password => {
                let user = user.clone();
                state.current_user = Some(user.clone());
                Ok(Self::session(user))
            }
            _ => Err(api_error("Invalid login credentials", 400)),
        }
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ClientError> {
        let user = AuthUser {
            id: UserId::generate(),
            email: Some(request.email.clone()),
            user_metadata: json!({ "full_name": request.full_name, "role": request.role }),
        };
        let mut state = self.state();
        state.accounts.insert(
            request.email.clone(),
            (request.password.clone(), user.clone()),
        );
        state
            .tables
            .entry("profiles".into())
            .or_default()
            .push(profile_row(user.id, request.role, request.full_name.as_deref().unwrap_or(""), 0));
        state.current_user = Some(user.clone());
        Ok(SignUpOutcome::SignedIn(Self::session(user)))
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        let mut state = self.state();
        Self::check_failure(&state, &["sign_out"])?;
        state.current_user = None;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        _email: &str,
        _redirect_to: Option<&str>,
    ) -> Result<(), ClientError> {
        Ok(())
    }

    async fn verify_otp(
        &self,
        token_hash: &str,
        _kind: OtpType,
    ) -> Result<AuthSession, ClientError> {
        let mut state = self.state();
        let user = state
            .recovery_tokens
            .remove(token_hash)
            .ok_or_else(|| api_error("Token has expired or is invalid", 403))?;
        state.current_user = Some(user.clone());
        Ok(Self::session(user))
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, ClientError> {
        let mut state = self.state();
        let user = state
            .current_user
            .clone()
            .ok_or_else(|| api_error("Auth session missing!", 401))?;
        state.passwords_set.push(new_password.to_string());
        Ok(user)
    }

    async fn admin_create_user(&self, identity: &NewIdentity) -> Result<AuthUser, ClientError> {
        let user = AuthUser {
            id: UserId::generate(),
            email: Some(identity.email.clone()),
            user_metadata: identity.user_metadata.clone(),
        };
        let mut state = self.state();
        Self::check_failure(&state, &["admin_create_user"])?;
        state
            .tables
            .entry("profiles".into())
            .or_default()
            .push(profile_row(user.id, Role::Student, "", 0));
        Ok(user)
    }

    async fn admin_delete_user(&self, user_id: UserId) -> Result<(), ClientError> {
        let mut state = self.state();
        let id = user_id.to_string();
        if let Some(rows) = state.tables.get_mut("profiles") {
            rows.retain(|row| field_text(row.get("id")).as_deref() != Some(id.as_str()));
        }
        state.deleted_users.push(user_id);
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, ClientError> {
        let mut state = self.state();
        let table = query.table_name().to_string();
        *state.selects.entry(table.clone()).or_default() += 1;
        Self::check_failure(&state, &[table.as_str()])?;

        let mut rows: Vec<Value> = state
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|row| matches(row, query)).cloned().collect())
            .unwrap_or_default();
        for (column, direction) in query.ordering().iter().rev() {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, ClientError> {
        let mut state = self.state();
        Self::check_failure(&state, &[table, format!("insert:{table}").as_str()])?;
        let mut row = row;
        if let Some(fields) = row.as_object_mut() {
            fields
                .entry("id")
                .or_insert_with(|| json!(UserId::generate().to_string()));
            fields.entry("created_at").or_insert_with(now_json);
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(vec![row])
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, ClientError> {
        let mut state = self.state();
        let table = query.table_name().to_string();
        *state.updates.entry(table.clone()).or_default() += 1;
        Self::check_failure(&state, &[table.as_str(), format!("update:{table}").as_str()])?;

        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|row| matches(row, query)) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<(), ClientError> {
        let mut state = self.state();
        let table = query.table_name().to_string();
        Self::check_failure(&state, &[table.as_str()])?;
        if let Some(rows) = state.tables.get_mut(&table) {
            rows.retain(|row| !matches(row, query));
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, params: Value) -> Result<Value, ClientError> {
        let handler = {
            let mut state = self.state();
            state.rpc_calls.push((function.to_string(), params.clone()));
            Self::check_failure(&state, &[function])?;
            state.rpc_handlers.get(function).cloned()
        };
        let Some(handler) = handler else {
            return Ok(Value::Null);
        };
        let mut state = self.state();
        handler(&mut state.tables, &params)
    }

    async fn payment(&self, endpoint: PaymentEndpoint, _body: Value) -> Result<Value, ClientError> {
        let mut state = self.state();
        state.payments += 1;
        state
            .payment_responses
            .get(endpoint.path())
            .cloned()
            .ok_or_else(|| api_error("payment route not scripted", 500))
    }
}

// ============================================================================
// Rows
// ============================================================================

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub fn profile_row(id: UserId, role: Role, name: &str, credits: i64) -> Value {
    json!({
        "id": id.to_string(),
        "role": role,
        "email": format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        "full_name": name,
        "gs_credit_balance": credits,
        "specialized_credit_balance": credits,
        "mentorship_credit_balance": credits,
        "is_available": true,
        "created_at": epoch(),
    })
}

/// Decrement one balance column of a profile row.
pub fn debit(tables: &mut Tables, user_id: &str, column: &str) {
    if let Some(rows) = tables.get_mut("profiles") {
        for row in rows {
            if row["id"] == user_id {
                let balance = row[column].as_i64().unwrap_or(0);
                row[column] = json!(balance - 1);
            }
        }
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Notices
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_level(NoticeLevel::Error)
    }

    pub fn successes(&self) -> Vec<String> {
        self.with_level(NoticeLevel::Success)
    }

    fn with_level(&self, level: NoticeLevel) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

// ============================================================================
// Checkout
// ============================================================================

pub struct ScriptedCheckout {
    outcome: CheckoutOutcome,
    opened: Mutex<Vec<CheckoutRequest>>,
}

impl ScriptedCheckout {
    pub fn completing() -> Arc<Self> {
        Self::with(CheckoutOutcome::Completed {
            payment_id: "pay_1".into(),
            signature: Some("sig".into()),
        })
    }

    pub fn with(outcome: CheckoutOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn opened(&self) -> Vec<CheckoutRequest> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutWidget for ScriptedCheckout {
    async fn load(&self) -> Result<(), String> {
        Ok(())
    }

    async fn open(&self, request: CheckoutRequest) -> CheckoutOutcome {
        self.opened.lock().unwrap().push(request);
        self.outcome.clone()
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub notices: Arc<RecordingNotifier>,
    pub ctx: StoreContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let backend = FakeBackend::new();
        let clock = Arc::new(ManualClock::new(epoch()));
        let notices = RecordingNotifier::new();
        let ctx = StoreContext::new(backend.clone())
            .with_clock(clock.clone())
            .with_notifier(notices.clone())
            .with_config(config);
        Self {
            backend,
            clock,
            notices,
            ctx,
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.clock.advance(chrono::Duration::milliseconds(ms));
    }

    pub fn identity(&self) -> Arc<IdentityStore> {
        Arc::new(IdentityStore::with_persistence(
            &self.ctx,
            Arc::new(MemoryPersistence::default()),
        ))
    }

    /// A signed-in identity store whose profile is already loaded.
    pub async fn signed_in(&self, role: Role, name: &str, credits: i64) -> Arc<IdentityStore> {
        let user_id = UserId::generate();
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        self.backend
            .seed("profiles", profile_row(user_id, role, name, credits));
        self.backend.add_account(&email, "secret", user_id);
        let identity = self.identity();
        identity.login(&email, "secret").await.unwrap();
        identity
    }
}
