//! API middleware.
//!
//! A single layer today: session resolution. It runs outside every handler
//! so each request sees a live, non-expired `WizardSession`.

pub mod session;
