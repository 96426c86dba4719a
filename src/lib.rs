//! Catalog Watch - multi-source product catalog monitor
//!
//! Periodically pulls product listings from heterogeneous storefronts,
//! normalizes them into one record shape, keeps a per-site SQLite catalog with
//! soft deletion after sustained absence, and pushes notifications for new
//! arrivals, price drops, restocks and deep discounts.

pub mod application;
pub mod domain;
pub mod infrastructure;
