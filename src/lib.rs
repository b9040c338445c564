pub mod alert;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod history;
pub mod output;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod watch;
pub mod watchlist;
