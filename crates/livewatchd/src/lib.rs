//! livewatch daemon - scan scheduler, liveness tracker and session store
//!
//! This crate provides the runtime behind the `livewatchd` binary:
//! - `config` - TOML settings and the target roster
//! - `scheduler` - periodic scans, parallel across platforms
//! - `tracker` - per-target liveness state and session transitions
//! - `store` - durable sessions and last-query status (SQLite)
//! - `avatar` - daily local cache of avatar images
//! - `service` - read-only queries for the CLI
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      livewatchd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   Scheduler     │────▶│   StatusSource (adapters)   │   │
//! │  │ (interval loop) │     │  bilibili, douyu, weibo ... │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ fetch results                                   │
//! │           ▼                                                 │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ LivenessTracker │────▶│      SessionStore           │   │
//! │  │ (state owner)   │     │   (sessions, status rows)   │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │  StatusService  │     │       AvatarCache           │   │
//! │  │   (queries)     │     │   (daily image refresh)     │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate does not `.unwrap()`, `.expect()` or
//! `panic!()`. Fallible operations return `Result` or `Option`, and a
//! failure for one target never stops the scan of another.

pub mod avatar;
pub mod config;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod tracker;
