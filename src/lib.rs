//! A lightweight syslog relay: listen, filter, transform, and forward.
//!
//! Messages arrive on configured UDP/TCP inputs in RFC 3164 or RFC 5424 form,
//! are matched against an ordered list of filter rules (first match wins),
//! optionally rewritten by named transforms, and forwarded to one or more
//! configured destinations with exponential-backoff retry.

pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod listener;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod transform;
