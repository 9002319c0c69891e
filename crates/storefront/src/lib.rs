//! Mercato storefront library.
//!
//! This crate provides the storefront JSON API as a library, allowing the
//! binary, the CLI and the integration tests to share one router.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
