// Copyright (c) Chained-BFT Contributors
// SPDX-License-Identifier: Apache-2.0

//! spec.md §4.7 "WAL & Recovery": "append-only with indices starting at
//! 1, mapped to block height + 1. Three entry kinds: (a) inbound
//! consensus message, (b) a new-block serialized record paired with its
//! RW-set, (c) commit marker ... Truncation: front is truncated every
//! 100 committed blocks." spec.md §9 "WAL write then act": every
//! side-effecting action appends before it mutates in-memory state, so a
//! crash mid-action always leaves a WAL tail replay can re-drive.

use consensus_types::{block::Block, common::Height, consensus_msg::SignedEnvelope};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal (de)serialization error: {0}")]
    Serde(#[from] bcs::Error),
    #[error("wal entry truncated or corrupt")]
    Truncated,
}

/// One record in the log. The index a given entry occupies is `height +
/// 1` (spec.md §4.7); this type carries `height` explicitly rather than
/// relying on file offset so truncation can drop a whole prefix by
/// height without renumbering anything after it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WalEntry {
    InboundMessage { height: Height, envelope: SignedEnvelope },
    NewBlockRecord { height: Height, block: Block, rw_set: Vec<u8> },
    CommitMarker { height: Height },
}

impl WalEntry {
    pub fn height(&self) -> Height {
        match self {
            WalEntry::InboundMessage { height, .. } => *height,
            WalEntry::NewBlockRecord { height, .. } => *height,
            WalEntry::CommitMarker { height } => *height,
        }
    }
}

/// An append-only, length-prefixed `bcs` log. Real deployments segment
/// this by file the way spec.md §6 describes
/// (`<store_root>/<chainId>/wal/`); this implementation keeps a single
/// growing file per chain, which is the same durability contract at the
/// scope this crate models storage at.
pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
    truncation_interval: u64,
    since_truncate: Mutex<u64>,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>, truncation_interval: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            truncation_interval,
            since_truncate: Mutex::new(0),
        })
    }

    /// spec.md §9 "write then act": appends and flushes before returning,
    /// so the caller only mutates in-memory state after this succeeds.
    pub fn append(&self, entry: &WalEntry) -> Result<(), WalError> {
        let bytes = bcs::to_bytes(entry)?;
        let mut file = self.file.lock().unwrap();
        file.write_all(&(bytes.len() as u32).to_le_bytes())?;
        file.write_all(&bytes)?;
        file.flush()?;
        if matches!(entry, WalEntry::CommitMarker { .. }) {
            let mut since = self.since_truncate.lock().unwrap();
            *since += 1;
            if *since >= self.truncation_interval {
                *since = 0;
                drop(since);
                self.truncate_front(entry.height())?;
            }
        }
        Ok(())
    }

    /// Replays every entry currently on file, in append order. Callers
    /// apply these without rebroadcasting (spec.md §4.7 "does not
    /// rebroadcast; outbound voting/proposing is suppressed" for the
    /// duration of replay).
    pub fn replay(&self) -> Result<Vec<WalEntry>, WalError> {
        let mut file = File::open(&self.path)?;
        let mut reader = BufReader::new(&mut file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).map_err(|_| WalError::Truncated)?;
            entries.push(bcs::from_bytes(&buf)?);
        }
        Ok(entries)
    }

    /// spec.md §4.7 "front is truncated every 100 committed blocks":
    /// drops every entry at or below `up_to_height`, keeping everything
    /// after. Rewrites the log file since a plain append-only file has
    /// no cheap way to drop a prefix in place.
    pub fn truncate_front(&self, up_to_height: Height) -> Result<(), WalError> {
        let remaining: Vec<WalEntry> = self
            .replay()?
            .into_iter()
            .filter(|e| e.height() > up_to_height)
            .collect();

        let mut file = self.file.lock().unwrap();
        *file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
        for entry in &remaining {
            let bytes = bcs::to_bytes(entry)?;
            file.write_all(&(bytes.len() as u32).to_le_bytes())?;
            file.write_all(&bytes)?;
        }
        file.flush()?;
        *file = OpenOptions::new().create(true).append(true).read(true).open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_types::test_utils as ctu;

    fn inbound(height: Height) -> WalEntry {
        let genesis = Block::genesis(0);
        let qc = ctu::quorum_cert_for_block(&genesis, &genesis, &[0]);
        WalEntry::InboundMessage {
            height,
            envelope: SignedEnvelope {
                payload: consensus_types::consensus_msg::ConsensusMsg::SyncInfo(
                    consensus_types::sync_info::SyncInfo::new(qc, None),
                ),
                signer: 0,
                signature: vec![],
            },
        }
    }

    #[test]
    fn append_then_replay_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 100).unwrap();
        wal.append(&inbound(1)).unwrap();
        wal.append(&WalEntry::CommitMarker { height: 1 }).unwrap();
        wal.append(&inbound(2)).unwrap();

        let entries = wal.replay().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].height(), 1);
    }

    #[test]
    fn truncation_drops_committed_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 2).unwrap();
        wal.append(&inbound(1)).unwrap();
        wal.append(&WalEntry::CommitMarker { height: 1 }).unwrap();
        wal.append(&inbound(2)).unwrap();
        // second commit marker crosses truncation_interval=2, dropping
        // everything at height <= 2.
        wal.append(&WalEntry::CommitMarker { height: 2 }).unwrap();

        let entries = wal.replay().unwrap();
        assert!(entries.iter().all(|e| e.height() > 2));
    }
}
