//! Wire formats: published key sets and token claims.

pub mod models;
