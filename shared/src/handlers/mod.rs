//! Request handlers: decode the body, call a service, shape the envelope.
//!
//! Handlers trust the principal they are given; resolving it belongs to the router.

pub mod achievements;
pub mod users;
