//! Intake HTTP API.
//!
//! Exposes the consultation wizard as JSON endpoints. Routes are nested
//! under `/api/`; every wizard route runs behind the session middleware,
//! which binds the request to a server-side `WizardSession`.
//!
//! The router is composable: `intake_api_router()` returns a `Router`
//! that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::intake_api_router;
pub use server::{start_server, IntakeServer, ServerError};
pub use types::ApiContext;
