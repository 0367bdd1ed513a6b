pub mod a1;
pub mod alerts;
pub mod attachment;
pub mod compose;
pub mod config;
pub mod contacts;
pub mod error;
pub mod google_api;
pub mod ledger;
pub mod mailer;
pub mod reconcile;
pub mod run_log;
pub mod runner;
pub mod sheet_status;
pub mod util;

pub use config::AppConfig;
pub use error::RunError;
pub use reconcile::RunSummary;
pub use runner::{execute_mailer, run_precheck};
