pub mod auth;
pub mod config;
pub mod errors;
pub mod exports;
pub mod http;
pub mod ledger;
pub mod models;
pub mod provisioning;
pub mod services;
pub mod utils;
pub mod workflow;

pub use auth::*;
pub use config::*;
pub use errors::*;
pub use exports::*;
pub use http::*;
pub use models::*;
pub use provisioning::*;
pub use services::*;
pub use utils::*;
pub use workflow::*;
