//! The identity store and the three role stores.

pub mod admin;
pub mod faculty;
pub mod identity;
pub mod student;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use evalhub_client::{Backend, BackendExt, ClientError, ProcedureCall, Query};
use evalhub_core::{MentorshipStatus, SessionUpdate};

use crate::error::{Result, StoreError};

/// A `'static` row read for a slice loader.
pub(crate) fn select_rows<T>(
    backend: &Arc<dyn Backend>,
    query: Query,
) -> impl Future<Output = Result<Vec<T>>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let backend = Arc::clone(backend);
    async move { Ok(backend.select_as::<T>(&query).await?) }
}

/// A `'static` procedure call for a slice loader.
pub(crate) fn call_procedure<P>(
    backend: &Arc<dyn Backend>,
    params: P,
) -> impl Future<Output = Result<P::Output>> + Send + 'static
where
    P: ProcedureCall + 'static,
    P::Output: 'static,
{
    let backend = Arc::clone(backend);
    async move { Ok(backend.call(&params).await?) }
}

/// Log a follow-up refresh that failed after its mutation succeeded. The
/// slice already reported the failure to the user.
pub(crate) fn log_refresh<T>(slice: &str, outcome: Result<T>) {
    if let Err(e) = outcome {
        tracing::warn!(slice, error = %e, "Refresh after mutation failed");
    }
}

/// The update as a JSON patch plus `updated_at` and any transition stamp.
pub(crate) fn transition_patch(
    update: &SessionUpdate,
    previous: MentorshipStatus,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Value> {
    let mut patch = serde_json::to_value(update).map_err(ClientError::from)?;
    let Some(fields) = patch.as_object_mut() else {
        return Err(StoreError::Validation("Session update must be an object".into()));
    };
    fields.insert("updated_at".into(), json!(now));
    match update.status {
        Some(MentorshipStatus::InProgress) if previous != MentorshipStatus::InProgress => {
            fields.insert("started_at".into(), json!(now));
        }
        Some(MentorshipStatus::Completed) if previous != MentorshipStatus::Completed => {
            fields.insert("completed_at".into(), json!(now));
        }
        _ => {}
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn entering_progress_stamps_started_at() {
        let now = Utc::now();
        let update = SessionUpdate {
            status: Some(MentorshipStatus::InProgress),
            ..SessionUpdate::default()
        };
        let patch = transition_patch(&update, MentorshipStatus::Scheduled, now).unwrap();
        assert_eq!(patch["status"], "in_progress");
        assert_eq!(patch["started_at"], json!(now));
        assert!(patch.get("completed_at").is_none());
    }

    #[test]
    fn repeated_status_is_not_restamped() {
        let update = SessionUpdate {
            status: Some(MentorshipStatus::Completed),
            mentor_notes: Some("Covered essay structure".into()),
            ..SessionUpdate::default()
        };
        let patch = transition_patch(&update, MentorshipStatus::Completed, Utc::now()).unwrap();
        assert!(patch.get("completed_at").is_none());
        assert!(patch.get("updated_at").is_some());
    }

    #[test]
    fn non_status_update_only_touches_updated_at() {
        let update = SessionUpdate {
            meeting_link: Some("https://meet.example.com/abc".into()),
            ..SessionUpdate::default()
        };
        let patch = transition_patch(&update, MentorshipStatus::Assigned, Utc::now()).unwrap();
        let keys: Vec<&String> = patch.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
    }
}
