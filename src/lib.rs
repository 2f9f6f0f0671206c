//! # workqueue
//!
//! Work-queue element lifecycle and distribution over Postgres or SQLite.
//!
//! Elements split from job specifications wait `Available` in a shared
//! backlog, agents claim them through subscriptions with
//! [`engine::WorkQueue::acquire`], and status reports drive them to `Done`,
//! `Failed` or `Canceled`. Data blocks referenced by elements form an
//! acyclic parentage graph kept by [`lineage::LineageTracker`].

pub mod admin;
pub mod binder;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod lineage;
pub mod model;
pub mod store;
pub mod telemetry;
pub mod validate;
