// src/packages/cpio.rs

//! Reader for "new ASCII" (SVR4 newc) CPIO archives, the RPM payload format
//!
//! Each entry is a 110-byte header of fixed-width hexadecimal fields, the
//! NUL-terminated name padded to a 4-byte boundary (counted from the start of
//! the header), then the data padded the same way. Symlink entries carry
//! their target in the data area. The archive ends with an entry named
//! `TRAILER!!!`.
//!
//! The reader only records where each entry's data lives; content is copied
//! out on demand with [`CpioReader::copy_data`].

use crate::error::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::debug;

/// CPIO New ASCII Format (newc) header size
const HEADER_SIZE: usize = 110;
/// Magic string for newc format
const MAGIC_NEWC: &[u8] = b"070701";
/// Magic string for CRC format
const MAGIC_CRC: &[u8] = b"070702";
/// Name of the entry that terminates the archive
pub const TRAILER_NAME: &str = "TRAILER!!!";

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// File type encoded in the mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl EntryKind {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFCHR => Self::CharDevice,
            S_IFBLK => Self::BlockDevice,
            S_IFIFO => Self::Fifo,
            S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// Parsed CPIO entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioEntry {
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    /// Data size; zero for symlinks once the target has been read
    pub size: u64,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub rdev_major: u32,
    pub rdev_minor: u32,
    pub check: u32,
    pub name: String,
    pub link_target: Option<String>,
    /// Offset of the data from the start of the stream
    pub data_offset: u64,
}

impl CpioEntry {
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }

    /// Permission bits (including setuid, setgid and sticky)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// True if this entry is one name of a multiply linked regular file
    pub fn is_hard_link(&self) -> bool {
        self.nlink > 1 && self.kind() == EntryKind::Regular
    }

    /// Key identifying the inode shared by hard links
    pub fn inode_key(&self) -> (u32, u32, u32) {
        (self.dev_major, self.dev_minor, self.ino)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    ExpectHeader,
    ReadingName,
    ReadingLinkTarget,
    ReadingData,
    Trailer,
    Done,
}

/// Header fields waiting for the name and data that follow them
#[derive(Debug)]
struct PendingEntry {
    entry: CpioEntry,
    namesize: u64,
}

/// A reader for CPIO (New ASCII) archives
pub struct CpioReader<R: Read + Seek> {
    reader: R,
    /// Stream position the archive starts at
    base: u64,
    /// Bytes available after `base`
    length: u64,
    /// Logical position relative to `base`
    offset: u64,
    state: ReaderState,
    pending: Option<PendingEntry>,
    entries_read: usize,
}

impl<R: Read + Seek> CpioReader<R> {
    /// Wrap a stream positioned at the first header
    pub fn new(mut reader: R) -> Result<Self> {
        let base = reader.stream_position()?;
        let end = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(base))?;

        Ok(Self {
            reader,
            base,
            length: end.saturating_sub(base),
            offset: 0,
            state: ReaderState::ExpectHeader,
            pending: None,
            entries_read: 0,
        })
    }

    /// Read the next entry from the CPIO archive
    ///
    /// Returns `Ok(None)` once the trailer has been read.
    pub fn next_entry(&mut self) -> Result<Option<CpioEntry>> {
        loop {
            match self.state {
                ReaderState::ExpectHeader => {
                    if !self.read_header()? {
                        debug!(
                            "CPIO stream ended without a trailer after {} entries",
                            self.entries_read
                        );
                        self.state = ReaderState::Done;
                    } else {
                        self.state = ReaderState::ReadingName;
                    }
                }
                ReaderState::ReadingName => {
                    let name = self.read_name()?;
                    if name == TRAILER_NAME {
                        self.state = ReaderState::Trailer;
                        continue;
                    }

                    let entry = &mut self.pending_mut()?.entry;
                    entry.name = name;
                    let (kind, size) = (entry.kind(), entry.size);

                    if kind == EntryKind::Symlink {
                        self.state = ReaderState::ReadingLinkTarget;
                    } else if size > 0 {
                        self.state = ReaderState::ReadingData;
                    } else {
                        return self.finish_entry().map(Some);
                    }
                }
                ReaderState::ReadingLinkTarget => {
                    let size = self.pending_mut()?.entry.size;
                    let target = self.read_link_target(size)?;
                    let entry = &mut self.pending_mut()?.entry;
                    entry.link_target = Some(target);
                    entry.size = 0;
                    return self.finish_entry().map(Some);
                }
                ReaderState::ReadingData => {
                    let size = self.pending_mut()?.entry.size;
                    let data_offset = self.offset;
                    if data_offset + size > self.length {
                        return Err(Error::Read {
                            offset: data_offset,
                            reason: format!(
                                "entry data of {} bytes runs past the end of the stream",
                                size
                            ),
                        });
                    }
                    self.pending_mut()?.entry.data_offset = data_offset;
                    let padded = (data_offset + size + 3) & !3;
                    self.seek_to(padded.min(self.length))?;
                    return self.finish_entry().map(Some);
                }
                ReaderState::Trailer => {
                    self.pending = None;
                    self.state = ReaderState::Done;
                }
                ReaderState::Done => return Ok(None),
            }
        }
    }

    /// Read every remaining entry
    pub fn entries(&mut self) -> Result<Vec<CpioEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Copy an entry's data into `writer`
    ///
    /// The reader's parsing position is preserved, so this can be called in
    /// the middle of iteration.
    pub fn copy_data<W: Write>(&mut self, entry: &CpioEntry, writer: &mut W) -> Result<u64> {
        self.reader
            .seek(SeekFrom::Start(self.base + entry.data_offset))?;
        let copied = io::copy(&mut (&mut self.reader).take(entry.size), writer)?;
        self.reader.seek(SeekFrom::Start(self.base + self.offset))?;

        if copied != entry.size {
            return Err(Error::Read {
                offset: entry.data_offset + copied,
                reason: format!(
                    "data for {} truncated: expected {} bytes, got {}",
                    entry.name, entry.size, copied
                ),
            });
        }
        Ok(copied)
    }

    /// Read an entry's data into memory
    pub fn read_data(&mut self, entry: &CpioEntry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.size as usize);
        self.copy_data(entry, &mut data)?;
        Ok(data)
    }

    fn pending_mut(&mut self) -> Result<&mut PendingEntry> {
        let offset = self.offset;
        self.pending.as_mut().ok_or_else(|| Error::Read {
            offset,
            reason: "entry state lost".to_string(),
        })
    }

    fn finish_entry(&mut self) -> Result<CpioEntry> {
        let offset = self.offset;
        let pending = self.pending.take().ok_or_else(|| Error::Read {
            offset,
            reason: "entry state lost".to_string(),
        })?;
        self.entries_read += 1;
        self.state = ReaderState::ExpectHeader;
        Ok(pending.entry)
    }

    /// Parse the fixed header; false on a clean end of stream
    fn read_header(&mut self) -> Result<bool> {
        let header_offset = self.offset;
        let mut header_buf = [0u8; HEADER_SIZE];
        let n = self.read_up_to(&mut header_buf)?;

        if n == 0 {
            if header_offset == 0 {
                return Err(Error::Read {
                    offset: 0,
                    reason: "empty, unreadable or compressed file".to_string(),
                });
            }
            return Ok(false);
        }
        if n < HEADER_SIZE {
            return Err(Error::Read {
                offset: header_offset,
                reason: format!("truncated header: {} of {} bytes", n, HEADER_SIZE),
            });
        }

        // Verify magic
        let magic = &header_buf[0..6];
        if magic != MAGIC_NEWC && magic != MAGIC_CRC {
            return Err(Error::Read {
                offset: header_offset,
                reason: format!("invalid CPIO magic {:?}", String::from_utf8_lossy(magic)),
            });
        }

        // Parse hex fields
        let parse_hex = |index: usize, field: &str| -> Result<u32> {
            let start = 6 + index * 8;
            let digits = &header_buf[start..start + 8];
            // from_str_radix would also take a leading sign
            Some(digits)
                .filter(|digits| digits.iter().all(u8::is_ascii_hexdigit))
                .and_then(|digits| std::str::from_utf8(digits).ok())
                .and_then(|s| u32::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::Read {
                    offset: header_offset + start as u64,
                    reason: format!("invalid hexadecimal value in header field {}", field),
                })
        };

        let entry = CpioEntry {
            ino: parse_hex(0, "ino")?,
            mode: parse_hex(1, "mode")?,
            uid: parse_hex(2, "uid")?,
            gid: parse_hex(3, "gid")?,
            nlink: parse_hex(4, "nlink")?,
            mtime: parse_hex(5, "mtime")?,
            size: u64::from(parse_hex(6, "filesize")?),
            dev_major: parse_hex(7, "devmajor")?,
            dev_minor: parse_hex(8, "devminor")?,
            rdev_major: parse_hex(9, "rdevmajor")?,
            rdev_minor: parse_hex(10, "rdevminor")?,
            check: parse_hex(12, "check")?,
            name: String::new(),
            link_target: None,
            data_offset: 0,
        };
        let namesize = u64::from(parse_hex(11, "namesize")?);

        self.pending = Some(PendingEntry { entry, namesize });
        Ok(true)
    }

    /// Read the NUL-terminated name and skip its padding
    fn read_name(&mut self) -> Result<String> {
        let name_offset = self.offset;
        let namesize = self.pending_mut()?.namesize;
        if namesize == 0 || name_offset + namesize > self.length {
            return Err(Error::Read {
                offset: name_offset,
                reason: format!("truncated or empty entry name ({} bytes)", namesize),
            });
        }

        // Read filename (including trailing NUL)
        let mut name_buf = vec![0u8; namesize as usize];
        self.read_exact_at_offset(&mut name_buf)?;
        let end = name_buf.iter().position(|&b| b == 0).unwrap_or(name_buf.len());
        let name = String::from_utf8_lossy(&name_buf[..end]).into_owned();

        // The trailer may legitimately be the last thing in the stream
        if name != TRAILER_NAME {
            let padded = (self.offset + 3) & !3;
            self.seek_to(padded.min(self.length))?;
        }
        Ok(name)
    }

    fn read_link_target(&mut self, size: u64) -> Result<String> {
        let target_offset = self.offset;
        if target_offset + size > self.length {
            return Err(Error::Read {
                offset: target_offset,
                reason: format!("symlink target of {} bytes runs past the end of the stream", size),
            });
        }

        let mut target = vec![0u8; size as usize];
        self.read_exact_at_offset(&mut target)?;
        let padded = (self.offset + 3) & !3;
        self.seek_to(padded.min(self.length))?;

        let end = target.iter().position(|&b| b == 0).unwrap_or(target.len());
        Ok(String::from_utf8_lossy(&target[..end]).into_owned())
    }

    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Read {
                        offset: self.offset + filled as u64,
                        reason: e.to_string(),
                    });
                }
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    fn read_exact_at_offset(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.offset;
        let n = self.read_up_to(buf)?;
        if n < buf.len() {
            return Err(Error::Read {
                offset: start,
                reason: format!("unexpected end of stream: needed {} bytes, got {}", buf.len(), n),
            });
        }
        Ok(())
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.base + offset))?;
        self.offset = offset;
        Ok(())
    }
}
