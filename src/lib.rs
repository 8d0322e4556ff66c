pub mod auth;
pub mod config;
pub mod events;
pub mod extractors;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod tutoring;
pub mod validation;
pub mod workers;
