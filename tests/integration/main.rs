//! End-to-end tests against an in-process HTTP backend.

mod dashboard_flow;
mod http_transport;
mod support;
