// src/packages/mod.rs

//! Package and archive support
//!
//! Detection classifies a file as one of the archive kinds the scanner can
//! open. RPM packages are decoded here from scratch (lead, headers,
//! compressed newc CPIO payload); zip and tar are delegated to their crates.

pub mod cpio;
pub mod detect;
pub mod extract;
pub mod rpm;
pub mod unpack;

pub use cpio::{CpioEntry, CpioReader, EntryKind};
pub use detect::{ArchiveFormat, classify};
pub use extract::extract_archive;
pub use rpm::{RpmDecoder, RpmPackage, extract_rpm, is_rpm};
pub use unpack::ExtractSummary;
