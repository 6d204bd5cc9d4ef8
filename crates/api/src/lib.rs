//! HTTP boundary of matflow: configuration, authentication, routing and
//! error mapping over the in-memory services.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
