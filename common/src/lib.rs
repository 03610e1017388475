// Core library for the scheduled exchange data puller

pub mod bootstrap;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod sftp;
pub mod telemetry;
