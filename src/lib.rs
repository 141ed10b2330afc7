// Declare all our modules
mod client;
mod config;
mod error;
mod fetcher;
pub mod logging;
mod models;
pub mod parsers;
pub mod server;

// Publicly export the parts of our library that users will need
pub use client::PortalClient;
pub use config::{PortalConfig, SessionTransport};
pub use error::{PortalError, Result};
pub use fetcher::{FetchedPage, HtmlFetcher, PortalRequest};
pub use models::*; // Exposes SessionToken, Scorecard, GradeEntry, etc.
