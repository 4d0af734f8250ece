//! API endpoint handlers.
//!
//! Each module corresponds to one page or action of the consultation wizard.
//! Handlers decode the request, lock the caller's session and delegate to
//! `intake::workflow`.

pub mod health;
pub mod report;
pub mod session;
pub mod steps;
pub mod vaccinations;
