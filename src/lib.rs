//! Persistent, project-scoped memory for AI coding assistants over MCP.
//!
//! Memorix gives many concurrent editor processes a shared knowledge base of
//! structured observations, entities, and relations. The same physical
//! project may be observed under several identifier forms; the alias
//! registry proves which ids belong together and search expands the whole
//! set, so memory is never split across editors.
//!
//! # Architecture
//!
//! - **Storage**: one flat directory of JSON files, published with
//!   temp-then-rename writes behind an advisory cross-process file lock
//! - **Search**: lexical field-boosted index with fuzzy tolerance, upgraded
//!   to hybrid scoring when a local embedding backend is available
//! - **Retention**: per-observation decay scores with immunity rules and
//!   one-way archival
//! - **Transport**: MCP over stdio
//!
//! # Modules
//!
//! - [`config`] — TOML configuration and environment overrides
//! - [`fsio`] — cross-process lock and atomic writes
//! - [`storage`] — durable file formats and the flattening migration
//! - [`project`] — project detection and the alias registry
//! - [`extract`] — heuristic entity extraction from free text
//! - [`embedding`] — optional local embedding backends and the two-layer cache
//! - [`index`] — the in-memory search index
//! - [`memory`] — observations, knowledge graph, retention, sessions
//! - [`engine`] — the startup sequence and component wiring

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fsio;
pub mod index;
pub mod memory;
pub mod project;
pub mod storage;
