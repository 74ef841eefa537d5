//! An in-memory key-value server with an actor-per-key execution model.
//!
//! This crate provides a key-value server speaking a line-oriented command
//! protocol. Its defining choice is that every live key is owned by an
//! independent, single-threaded actor:
//!
//! - String, hash, list and set keys each get their own value actor
//! - A process-wide directory actor owns the key table, routes every
//!   command, materializes actors lazily and manages expiration
//! - Blocking list pops park the request and answer it later, woken
//!   first-come-first-served
//! - Multi-key reads aggregate through a transient collector actor
//!
//! Per-key commands are linearizable; cross-key commands are not atomic.
//! All state is in-memory and lost on process exit.

pub mod actors;
pub mod collector;
pub mod connection;
pub mod directory;
pub mod payload;
pub mod registry;
pub mod server;
