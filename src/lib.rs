//! Turnstile - In-Process Request Admission Control
//!
//! This crate decides, per incoming request, whether to allow, queue, or
//! reject work under one of four rate-limiting disciplines: concurrency
//! limiting, fixed window, sliding window, and token bucket. A request
//! pipeline looks up a named policy in the [`registry::Registry`] and asks
//! its limiter for a [`limiter::Lease`] before executing a handler; the
//! pipeline itself (routing, status-code mapping, authorization) stays
//! outside this crate.
//!
//! Limiting is single-process and in-memory, and policies are fixed at
//! construction.

pub mod config;
pub mod error;
pub mod limiter;
pub mod registry;
