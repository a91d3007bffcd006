//! # Context Sync
//!
//! A reconciliation engine that converges one or more target knowledge
//! stores toward the documents held by one or more sources.
//!
//! Every run recomputes state from scratch: metadata is listed on both
//! sides, diffed into a plan, and the plan is applied in throttled batches
//! that tolerate partial failure.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌─────────────┐
//! │  Sources    │──▶│  Fetch   │──▶│ Planner │──▶│ Reconciler │──▶│  Targets    │
//! │ (listings)  │   │ metadata │   │  (diff) │   │  (batches) │   │ (mutations) │
//! └──────┬──────┘   └──────────┘   └─────────┘   └─────┬──────┘   └─────────────┘
//!        │                                             │
//!        └──────── download ──▶ Staging ◀──── upload ──┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctxsync plan                  # show what would change
//! ctxsync sync --dry-run        # log intended effects only
//! ctxsync sync                  # converge all targets
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Document metadata, operations, plans |
//! | [`planner`] | Metadata diffing |
//! | [`fetch`] | Source and target metadata listing |
//! | [`staging`] | Per-run temporary content area |
//! | [`reconcile`] | Batched plan execution |
//! | [`engine`] | Run orchestration across targets |
//! | [`traits`] | Connector contracts and registry |
//! | [`connector_fs`] | Filesystem source |
//! | [`connector_dir`] | Directory-backed target |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | Structured logger |

pub mod config;
pub mod connector_dir;
pub mod connector_fs;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod planner;
pub mod reconcile;
pub mod staging;
pub mod traits;
