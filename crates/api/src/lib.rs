//! HTTP API: operation facade, routing, and request/response mapping.

pub mod app;
pub mod facade;
pub mod middleware;
