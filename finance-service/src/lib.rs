//! Finance service: commission and operator payment ledgers, the
//! closing engine and the financial reporting layer for the travel
//! back office.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
