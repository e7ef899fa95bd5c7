pub mod api;
pub mod campaign;
pub mod campaigns;
pub mod charts;
pub mod cli;
pub mod competition;
pub mod config;
pub mod controller_core;
pub mod controller_state;
pub mod controllers;
pub mod errors;
pub mod impressions;
pub mod logger;
pub mod report;
pub mod scenarios;
pub mod service;
pub mod simulationrun;
pub mod state;
pub mod traffic;
pub mod utils;
