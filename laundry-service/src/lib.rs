//! Laundry Service - receipt payments, collection and daily cash reconciliation.

pub mod config;
pub mod domain;
pub mod models;
pub mod services;
pub mod startup;
