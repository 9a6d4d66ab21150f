//! HTTP implementation of [`Backend`] for a PostgREST + GoTrue style backend.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;

use evalhub_core::UserId;

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::query::Query;
use crate::types::{
    AuthSession, AuthUser, NewIdentity, OtpType, PaymentEndpoint, SignUpOutcome, SignUpRequest,
};

/// Error body shapes of the data and auth services, merged.
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl BackendErrorBody {
    fn into_error(self, status: u16) -> ClientError {
        let code = self.error_code.or_else(|| match self.code {
            Some(Value::String(s)) => Some(s),
            _ => None,
        });
        let message = self
            .message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        ClientError::Api {
            code,
            message,
            status,
        }
    }
}

/// Signup may answer with a session or a bare identity.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(AuthSession),
    User(AuthUser),
}

/// Backend client over HTTP.
///
/// Holds the access token of the signed-in session; data calls made while
/// signed out use the anon key as bearer.
#[derive(Debug)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    app_url: String,
    anon_key: String,
    service_role_key: Option<String>,
    session: RwLock<Option<AuthSession>>,
}

impl RestBackend {
    /// Create a backend client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            app_url: config.app_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
            session: RwLock::new(None),
        })
    }

    /// Resume a session obtained elsewhere (for example a persisted token).
    pub async fn set_session(&self, session: Option<AuthSession>) {
        *self.session.write().await = session;
    }

    /// Access token of the current session, if signed in.
    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    async fn bearer(&self) -> String {
        self.access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone())
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self.bearer().await;
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    fn admin_request(&self, method: Method, url: &str) -> Result<RequestBuilder, ClientError> {
        let key = self.service_role_key.as_ref().ok_or_else(|| {
            ClientError::Configuration("service role key required for admin auth calls".into())
        })?;
        Ok(self
            .client
            .request(method, url)
            .header("apikey", key)
            .header("Authorization", format!("Bearer {key}")))
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.base_url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    /// Handle API response and convert errors. Empty bodies decode as `null`.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&body)?);
        }

        let err = match serde_json::from_str::<BackendErrorBody>(&body) {
            Ok(parsed) => parsed.into_error(status.as_u16()),
            Err(_) => ClientError::Api {
                code: None,
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            },
        };
        tracing::debug!(status = status.as_u16(), error = %err, "Backend call rejected");
        Err(err)
    }

    async fn handle_rows(&self, response: reqwest::Response) -> Result<Vec<Value>, ClientError> {
        match self.handle_response(response).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn store_session(&self, value: Value) -> Result<AuthSession, ClientError> {
        let session: AuthSession = serde_json::from_value(value)?;
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_user(&self) -> Result<Option<AuthUser>, ClientError> {
        if self.access_token().await.is_none() {
            return Ok(None);
        }

        let response = self
            .request(Method::GET, &self.auth_url("user"))
            .await
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::debug!("Stored session rejected, treating as signed out");
            *self.session.write().await = None;
            return Ok(None);
        }

        let value = self.handle_response(response).await?;
        Ok(Some(serde_json::from_value(value)?))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError> {
        let response = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let value = self.handle_response(response).await?;
        self.store_session(value).await
    }

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ClientError> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&json!({
                "email": request.email,
                "password": request.password,
                "data": {
                    "full_name": request.full_name,
                    "role": request.role,
                },
            }))
            .send()
            .await?;

        let value = self.handle_response(response).await?;
        match serde_json::from_value(value)? {
            SignUpResponse::Session(session) => {
                *self.session.write().await = Some(session.clone());
                Ok(SignUpOutcome::SignedIn(session))
            }
            SignUpResponse::User(user) => Ok(SignUpOutcome::ConfirmationRequired(user)),
        }
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        if self.access_token().await.is_none() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, &self.auth_url("logout"))
            .await
            .send()
            .await;
        // The local session is dropped even if the server call fails.
        *self.session.write().await = None;
        self.handle_response(response?).await?;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut builder = self
            .client
            .post(self.auth_url("recover"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email }));
        if let Some(redirect) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect)]);
        }

        let response = builder.send().await?;
        self.handle_response(response).await?;
        Ok(())
    }

    async fn verify_otp(
        &self,
        token_hash: &str,
        kind: OtpType,
    ) -> Result<AuthSession, ClientError> {
        let response = self
            .client
            .post(self.auth_url("verify"))
            .header("apikey", &self.anon_key)
            .json(&json!({ "type": kind, "token_hash": token_hash }))
            .send()
            .await?;

        let value = self.handle_response(response).await?;
        self.store_session(value).await
    }

    async fn update_password(&self, new_password: &str) -> Result<AuthUser, ClientError> {
        if self.access_token().await.is_none() {
            return Err(ClientError::NotAuthenticated);
        }

        let response = self
            .request(Method::PUT, &self.auth_url("user"))
            .await
            .json(&json!({ "password": new_password }))
            .send()
            .await?;

        let value = self.handle_response(response).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn admin_create_user(&self, identity: &NewIdentity) -> Result<AuthUser, ClientError> {
        let response = self
            .admin_request(Method::POST, &self.auth_url("admin/users"))?
            .json(identity)
            .send()
            .await?;

        let value = self.handle_response(response).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn admin_delete_user(&self, user_id: UserId) -> Result<(), ClientError> {
        let response = self
            .admin_request(
                Method::DELETE,
                &self.auth_url(&format!("admin/users/{user_id}")),
            )?
            .send()
            .await?;

        self.handle_response(response).await?;
        Ok(())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Value>, ClientError> {
        let response = self
            .request(Method::GET, &self.rest_url(query.table_name()))
            .await
            .query(&query.to_read_params())
            .send()
            .await?;

        self.handle_rows(response).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, ClientError> {
        let response = self
            .request(Method::POST, &self.rest_url(table))
            .await
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        self.handle_rows(response).await
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, ClientError> {
        let response = self
            .request(Method::PATCH, &self.rest_url(query.table_name()))
            .await
            .header("Prefer", "return=representation")
            .query(&query.to_filter_params())
            .json(&patch)
            .send()
            .await?;

        self.handle_rows(response).await
    }

    async fn delete(&self, query: &Query) -> Result<(), ClientError> {
        let response = self
            .request(Method::DELETE, &self.rest_url(query.table_name()))
            .await
            .query(&query.to_filter_params())
            .send()
            .await?;

        self.handle_response(response).await?;
        Ok(())
    }

    async fn rpc(&self, function: &str, params: Value) -> Result<Value, ClientError> {
        tracing::debug!(function, "Calling remote procedure");
        let response = self
            .request(Method::POST, &self.rest_url(&format!("rpc/{function}")))
            .await
            .json(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn payment(
        &self,
        endpoint: PaymentEndpoint,
        body: Value,
    ) -> Result<Value, ClientError> {
        let url = format!("{}{}", self.app_url, endpoint.path());
        let response = self.request(Method::POST, &url).await.json(&body).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_trims_trailing_slash() {
        let backend =
            RestBackend::new(&ClientConfig::for_url("http://localhost:54321/", "anon")).unwrap();
        assert_eq!(backend.base_url, "http://localhost:54321");
        assert_eq!(
            backend.rest_url("answers"),
            "http://localhost:54321/rest/v1/answers"
        );
    }

    #[test]
    fn error_body_prefers_message_then_msg() {
        let body: BackendErrorBody = serde_json::from_value(json!({
            "code": "P0001",
            "message": "Insufficient credits",
            "details": null
        }))
        .unwrap();
        let err = body.into_error(400);
        assert_eq!(err.to_string(), "Insufficient credits");
        assert_eq!(err.code(), Some("P0001"));

        let auth: BackendErrorBody = serde_json::from_value(json!({
            "code": 400,
            "error_code": "invalid_credentials",
            "msg": "Invalid login credentials"
        }))
        .unwrap();
        let err = auth.into_error(400);
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(err.code(), Some("invalid_credentials"));
    }

    #[test]
    fn admin_calls_need_service_key() {
        let backend =
            RestBackend::new(&ClientConfig::for_url("http://localhost:54321", "anon")).unwrap();
        let err = backend
            .admin_request(Method::POST, "http://localhost/admin")
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
