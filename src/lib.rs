pub mod app;
pub mod composition;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod manifest;
pub mod output;
pub mod plan;
pub mod reconcile;
pub mod resolve;
pub mod scheduler;
pub mod script;
pub mod store;
pub mod submit;
