//! authservice: external authorization service for Envoy-style proxies.
//!
//! Checks are gated by trigger rules, routed to the first matching filter
//! chain and run through a fresh per-request pipeline of filters. The
//! pipeline's outcome code is translated into the decision returned to the
//! proxy. Chain-scoped state is swept by a periodic cleanup tick.

pub mod api;
pub mod bootstrap;
pub mod check;
pub mod config;
pub mod filter;
pub mod http;
pub mod rules;
pub mod service;
pub mod session;
pub mod telemetry;
