//! tapevault - offline concert-archive metadata sync and caching
//!
//! Ingests a periodically published archive of show and recording metadata
//! into a local SQLite store, and maintains an expiring file cache for
//! per-recording detail pages fetched from Archive.org.

pub mod cli;
pub mod config;
pub mod db;
pub mod services;
