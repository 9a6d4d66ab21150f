//! The backend seam.
//!
//! Everything the stores need from the managed backend goes through
//! [`Backend`]: auth, table reads and writes, stored procedures and the payment
//! routes. The trait speaks JSON so it stays object safe; [`BackendExt`]
//! layers typed helpers on top.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use evalhub_core::UserId;

use crate::error::ClientError;
use crate::query::Query;
use crate::rpc::ProcedureCall;
use crate::types::{
    AuthSession, AuthUser, NewIdentity, OtpType, PaymentEndpoint, SignUpOutcome, SignUpRequest,
};

/// Remote backend operations.
#[async_trait]
pub trait Backend: Send + Sync {
    // =========================================================================
    // Auth
    // =========================================================================

    /// The identity of the current session, or `None` when signed out.
    async fn current_user(&self) -> Result<Option<AuthUser>, ClientError>;

    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, ClientError>;

    /// Register a new identity.
    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ClientError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), ClientError>;

    /// Email a password recovery link.
    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ClientError>;

    /// Exchange a one-time token from an email link for a session.
    async fn verify_otp(&self, token_hash: &str, kind: OtpType)
        -> Result<AuthSession, ClientError>;

    /// Set a new password for the signed-in identity.
    async fn update_password(&self, new_password: &str) -> Result<AuthUser, ClientError>;

    /// Create an identity with admin privileges.
    async fn admin_create_user(&self, identity: &NewIdentity) -> Result<AuthUser, ClientError>;

    /// Delete an identity with admin privileges. The profile row cascades.
    async fn admin_delete_user(&self, user_id: UserId) -> Result<(), ClientError>;

    // =========================================================================
    // Tables
    // =========================================================================

    /// Read rows.
    async fn select(&self, query: &Query) -> Result<Vec<Value>, ClientError>;

    /// Insert one row and return the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Vec<Value>, ClientError>;

    /// Patch matching rows and return them.
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>, ClientError>;

    /// Delete matching rows.
    async fn delete(&self, query: &Query) -> Result<(), ClientError>;

    // =========================================================================
    // Procedures and payment routes
    // =========================================================================

    /// Call a stored procedure by name with named parameters.
    async fn rpc(&self, function: &str, params: Value) -> Result<Value, ClientError>;

    /// Call one of the payment routes.
    async fn payment(&self, endpoint: PaymentEndpoint, body: Value)
        -> Result<Value, ClientError>;
}

/// Typed helpers over any [`Backend`].
#[async_trait]
pub trait BackendExt: Backend {
    /// Read rows and decode each one.
    async fn select_as<T>(&self, query: &Query) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.select(query).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(ClientError::from))
            .collect()
    }

    /// Read the first matching row, if any.
    async fn select_maybe<T>(&self, query: &Query) -> Result<Option<T>, ClientError>
    where
        T: DeserializeOwned + Send,
    {
        let query = query.clone().limit(1);
        let mut rows = self.select_as::<T>(&query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Read exactly one row.
    async fn select_one<T>(&self, query: &Query) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send,
    {
        self.select_maybe(query)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                table: query.table_name().to_string(),
            })
    }

    /// Insert a row and decode the stored representation.
    async fn insert_as<T>(&self, table: &str, row: Value) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.insert(table, row).await?;
        let first = rows.into_iter().next().ok_or_else(|| ClientError::NotFound {
            table: table.to_string(),
        })?;
        Ok(serde_json::from_value(first)?)
    }

    /// Patch rows and decode the updated representations.
    async fn update_as<T>(&self, query: &Query, patch: Value) -> Result<Vec<T>, ClientError>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.update(query, patch).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(ClientError::from))
            .collect()
    }

    /// Call the procedure a parameter payload belongs to.
    async fn call<P>(&self, params: &P) -> Result<P::Output, ClientError>
    where
        P: ProcedureCall,
    {
        let value = serde_json::to_value(params)?;
        let result = self.rpc(P::PROCEDURE.name(), value).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Call a payment route with a typed body and response.
    async fn payment_as<B, T>(&self, endpoint: PaymentEndpoint, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let value = serde_json::to_value(body)?;
        let result = self.payment(endpoint, value).await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl<B: Backend + ?Sized> BackendExt for B {}
