// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! One JSON entry per line, each carrying a sequence number and a CRC32 of
//! its mutation. Every append is fsynced before it returns. A torn final
//! line (crash mid-write) is dropped on open; corruption anywhere else is an
//! error.

use nx_core::Mutation;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt WAL entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// A single entry in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub mutation: Mutation,
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(seq: u64, mutation: Mutation) -> Result<Self, WalError> {
        let checksum = checksum(&mutation)?;
        Ok(Self {
            seq,
            mutation,
            checksum,
        })
    }

    /// Verify the checksum matches the mutation
    pub fn verify(&self) -> bool {
        checksum(&self.mutation)
            .map(|c| c == self.checksum)
            .unwrap_or(false)
    }
}

fn checksum(mutation: &Mutation) -> Result<u32, WalError> {
    let json = serde_json::to_string(mutation)?;
    Ok(crc32fast::hash(json.as_bytes()))
}

/// Result of scanning a log file
struct Scan {
    entries: Vec<WalEntry>,
    /// Byte length of the valid prefix
    valid_len: u64,
    total_len: u64,
}

fn scan(path: &Path) -> Result<Scan, WalError> {
    let mut content = String::new();
    match File::open(path) {
        Ok(mut f) => {
            f.read_to_string(&mut content)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Scan {
                entries: Vec::new(),
                valid_len: 0,
                total_len: 0,
            })
        }
        Err(e) => return Err(e.into()),
    }

    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut valid_len = 0u64;
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let last = lines.len().saturating_sub(1);

    for (i, raw) in lines.iter().enumerate() {
        offset += raw.len() as u64;
        let line = raw.trim_end_matches('\n');
        if line.trim().is_empty() {
            valid_len = offset;
            continue;
        }

        let parsed = serde_json::from_str::<WalEntry>(line)
            .map_err(|e| e.to_string())
            .and_then(|entry| {
                if entry.verify() {
                    Ok(entry)
                } else {
                    Err("checksum mismatch".to_string())
                }
            });

        match parsed {
            Ok(entry) if raw.ends_with('\n') => {
                entries.push(entry);
                valid_len = offset;
            }
            // Only the final line may be torn
            Ok(_) if i == last => break,
            Err(_) if i == last => break,
            Ok(_) => {
                return Err(WalError::Corrupt {
                    line: i + 1,
                    reason: "missing line terminator".into(),
                })
            }
            Err(reason) => return Err(WalError::Corrupt { line: i + 1, reason }),
        }
    }

    Ok(Scan {
        entries,
        valid_len,
        total_len: content.len() as u64,
    })
}

/// Write-ahead log for durable mutation storage
pub struct Wal {
    file: File,
    sequence: u64,
}

impl Wal {
    /// Open or create a WAL at the given path, dropping a torn tail
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let scan = scan(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        if scan.valid_len < scan.total_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = scan.total_len - scan.valid_len,
                "truncating torn WAL tail"
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let sequence = scan.entries.last().map(|e| e.seq).unwrap_or(0);
        Ok(Self { file, sequence })
    }

    /// Append a mutation to the log
    pub fn append(&mut self, mutation: &Mutation) -> Result<u64, WalError> {
        let entry = WalEntry::new(self.sequence + 1, mutation.clone())?;
        let line = serde_json::to_string(&entry)?;
        writeln!(self.file, "{}", line)?;
        self.file.sync_all()?;
        self.sequence = entry.seq;
        Ok(self.sequence)
    }

    /// Get the current sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Replay all mutations from the log
    pub fn replay(path: &Path) -> Result<Vec<Mutation>, WalError> {
        Ok(scan(path)?
            .entries
            .into_iter()
            .map(|e| e.mutation)
            .collect())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
