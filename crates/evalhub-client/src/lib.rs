//! Evalhub backend client SDK.
//!
//! This crate is the only place that knows how the managed backend is reached:
//! table endpoints, stored procedures, auth and the payment routes. Stores
//! depend on the [`Backend`] trait, so tests swap in an in-memory double.
//!
//! # Example
//!
//! ```no_run
//! use evalhub_client::{BackendExt, ClientConfig, Query, RestBackend};
//! use evalhub_core::Plan;
//!
//! # async fn example() -> Result<(), evalhub_client::ClientError> {
//! let backend = RestBackend::new(&ClientConfig::from_env())?;
//!
//! let plans: Vec<Plan> = backend
//!     .select_as(&Query::table("plans").eq("is_active", true).order_desc("created_at"))
//!     .await?;
//!
//! println!("{} plans on sale", plans.len());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod backend;
mod config;
mod error;
mod query;
mod rest;
pub mod rpc;
mod types;

pub use backend::{Backend, BackendExt};
pub use config::ClientConfig;
pub use error::{is_already_authenticated, ClientError};
pub use query::{AnyIlike, Direction, Filter, FilterOp, Query};
pub use rest::RestBackend;
pub use rpc::{ProcedureCall, RemoteProcedure};
pub use types::*;
