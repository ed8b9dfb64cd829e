pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod ports;
pub mod services;
pub mod startup;
pub mod stellar;
pub mod validation;
