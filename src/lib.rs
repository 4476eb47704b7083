//! drainwatch: a service that drains gracefully
//!
//! On stop it keeps serving but reports 503 on `/$status` for a fixed drain
//! window, so load balancers route away before the process exits.

pub mod config;
pub mod host;
pub mod lifecycle;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;
