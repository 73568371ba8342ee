//! Outbound HTTP clients (key-set endpoint, identity provider).

pub mod http;
pub mod idp;
