// src/filesystem/mod.rs

//! Filesystem helpers for extraction
//!
//! Safe joining of untrusted archive member names and self-cleaning scratch
//! directories.

pub mod path;
mod workspace;

pub use workspace::Workspace;
