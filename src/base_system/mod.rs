pub mod config;
pub mod context;
pub mod logging;
pub mod retry;
pub mod url_check;
