//! Corkboard server library.
//!
//! Request admission and access control for the social wall API: every
//! request passes an ordered pipeline of method, network, rate-limit,
//! authentication and role checks before reaching a handler.

pub mod admission;
pub mod api;
pub mod auth;
pub mod config;
pub mod pipeline;
