//! # mods-export
//!
//! Streams an entity tree from a content-addressed store into a single MODS
//! `<modsCollection>` document, one record per entity, without holding the
//! tree in memory and without letting one bad entity fail the job.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐   ┌────────────┐
//! │ ObjectStore │──▶│   traverse   │──▶│    process     │──▶│   writer   │
//! │ HTTP / mem  │   │ BFS, batches │   │ crosswalk+link │   │ file sink  │
//! └─────────────┘   └──────┬───────┘   └────────────────┘   └────────────┘
//!                          ▼
//!                    summary / progress / notify
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Manifests, traversal nodes, outcomes |
//! | [`source`] | Source metadata, relationship graph, file descriptors |
//! | [`store`] | Upstream store trait, HTTP and in-memory stores |
//! | [`mods`] | MODS document model, crosswalk, annotation, linking, rendering |
//! | [`process`] | Per-entity pipeline |
//! | [`traverse`] | Breadth-first traversal with batch concurrency |
//! | [`writer`] | Streaming collection writer |
//! | [`summary`] | Job summary and memory sampling |
//! | [`progress`] | Progress events on stderr |
//! | [`notify`] | Completion webhook |
//! | [`export`] | `export` / `preview` commands |
//! | [`text`] | Truncation and whitespace helpers |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod mods;
pub mod notify;
pub mod process;
pub mod progress;
pub mod source;
pub mod store;
pub mod summary;
pub mod text;
pub mod traverse;
pub mod writer;
