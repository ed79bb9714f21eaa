//! Core memory engine — observations, knowledge graph, retention, sessions.
//!
//! The write path ([`observations`]) owns the reconcile-on-write discipline;
//! [`graph`] keeps the entity/relation store; [`retention`] scores and
//! archives; [`session`] tracks session windows. Record definitions live in
//! [`types`].

pub mod graph;
pub mod observations;
pub mod retention;
pub mod session;
pub mod types;
