// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Builders for synthetic newc CPIO streams and RPM packages, plus the
//! compressors used to wrap payloads.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use walkdir::WalkDir;

pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];

/// Builds a newc CPIO stream entry by entry
#[derive(Default)]
pub struct CpioBuilder {
    buf: Vec<u8>,
    next_ino: u32,
}

impl CpioBuilder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            next_ino: 100,
        }
    }

    fn pad4(&mut self) {
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
    }

    /// Append one raw entry
    pub fn entry(&mut self, ino: u32, mode: u32, nlink: u32, name: &str, data: &[u8]) -> &mut Self {
        let header = format!(
            "070701{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}",
            ino,
            mode,
            0,
            0,
            nlink,
            1_600_000_000u32,
            data.len(),
            253,
            0,
            0,
            0,
            name.len() + 1,
            0
        );
        self.buf.extend_from_slice(header.as_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
        self.pad4();
        self.buf.extend_from_slice(data);
        self.pad4();
        self
    }

    fn ino(&mut self) -> u32 {
        self.next_ino += 1;
        self.next_ino
    }

    pub fn file(&mut self, name: &str, data: &[u8]) -> &mut Self {
        let ino = self.ino();
        self.entry(ino, S_IFREG | 0o644, 1, name, data)
    }

    pub fn dir(&mut self, name: &str, perm: u32) -> &mut Self {
        let ino = self.ino();
        self.entry(ino, S_IFDIR | perm, 2, name, b"")
    }

    pub fn symlink(&mut self, name: &str, target: &str) -> &mut Self {
        let ino = self.ino();
        self.entry(ino, S_IFLNK | 0o777, 1, name, target.as_bytes())
    }

    /// Hard link set the way rpm writes it: every name but the last is empty
    pub fn hard_links(&mut self, names: &[&str], data: &[u8]) -> &mut Self {
        let ino = self.ino();
        let nlink = names.len() as u32;
        for (i, name) in names.iter().enumerate() {
            let content: &[u8] = if i + 1 == names.len() { data } else { b"" };
            self.entry(ino, S_IFREG | 0o644, nlink, name, content);
        }
        self
    }

    /// Bytes so far, without a trailer
    pub fn unterminated(&self) -> Vec<u8> {
        self.buf.clone()
    }

    /// Bytes with the `TRAILER!!!` entry appended
    pub fn build(&self) -> Vec<u8> {
        let mut builder = Self {
            buf: self.buf.clone(),
            next_ino: self.next_ino,
        };
        builder.entry(0, 0, 1, "TRAILER!!!", b"");
        builder.buf
    }
}

/// RPM lead: magic, version, and zero filler up to 96 bytes
pub fn rpm_lead(major: u8) -> Vec<u8> {
    let mut lead = vec![0u8; 96];
    lead[..4].copy_from_slice(&LEAD_MAGIC);
    lead[4] = major;
    lead
}

/// Header section: descriptor, index records and data store
pub fn rpm_header_section(entries: u32, data_size: u32) -> Vec<u8> {
    let mut section = Vec::new();
    section.extend_from_slice(&HEADER_MAGIC);
    section.extend_from_slice(&[0u8; 4]);
    section.extend_from_slice(&entries.to_be_bytes());
    section.extend_from_slice(&data_size.to_be_bytes());
    section.resize(16 + 16 * entries as usize + data_size as usize, 0x42);
    section
}

/// Complete package around an already compressed payload
pub fn rpm_package(major: u8, compressed_payload: &[u8]) -> Vec<u8> {
    let mut rpm = rpm_lead(major);
    rpm.extend(rpm_header_section(3, 21));
    while rpm.len() % 8 != 0 {
        rpm.push(0);
    }
    rpm.extend(rpm_header_section(5, 40));
    rpm.extend_from_slice(compressed_payload);
    rpm
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Legacy `.lzma` (lzma_alone) stream
pub fn lzma(data: &[u8]) -> Vec<u8> {
    let options = xz2::stream::LzmaOptions::new_preset(6).unwrap();
    let stream = xz2::stream::Stream::new_lzma_encoder(&options).unwrap();
    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Tarball with the given regular files
pub fn tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

/// A package whose payload exercises directories, symlinks and hard links
pub fn sample_cpio() -> Vec<u8> {
    CpioBuilder::new()
        .dir("./usr", 0o755)
        .dir("./usr/lib", 0o755)
        .dir("./usr/share/doc/libcrypt", 0o555)
        .file("./usr/lib/libcrypt.so.1", b"\x7fELF libcrypt blowfish")
        .file("./usr/share/doc/libcrypt/README", b"Uses bcrypt and SHA-512 crypt.\n")
        .symlink("./usr/lib/libcrypt.so", "libcrypt.so.1")
        .hard_links(
            &["./usr/bin/mkpasswd", "./usr/bin/crypt-passwd"],
            b"#!/bin/sh\nexec openssl passwd -6 \"$@\"\n",
        )
        .build()
}

/// Regular files below `root`, keyed by relative path
pub fn tree_contents(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (relative, std::fs::read(entry.path()).unwrap())
        })
        .collect()
}
