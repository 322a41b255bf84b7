//! chobo: a bookkeeping and tax assistant for Japanese sole proprietors,
//! driven through LINE.
//!
//! Users send transactions as chat messages, receipt photos or voice notes.
//! The webhook queues each event; workers turn them into double-entry journal
//! entries and reply over the Messaging API. A scheduler pushes monthly,
//! quarterly and tax-season reports and reminders.

pub mod accounting;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
