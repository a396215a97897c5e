//! Shared-memory participant table
//!
//! A fixed table of live-process records in a memory-mapped file whose
//! name carries a hash of the canonical data directory, so independent
//! databases on one machine never share a table. Each attached process
//! claims one slot, refreshes its heartbeat, and clears the slot on
//! detach. Any process may reclaim a slot whose heartbeat has gone stale
//! (a crashed peer).
//!
//! Writes are per-slot and single-word; the header's process count is
//! recomputed from the active flags after every mutation rather than
//! maintained blindly, so a lost update heals on the next pass.

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use nendb_core::limits::PARTICIPANT_SLOTS;
use nendb_core::{Error, PoolKind, Result};
use nendb_storage::mix64;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Magic identifying the table: "NENS".
pub const PARTICIPANT_MAGIC: u32 = 0x4E45_4E53;

/// Table format version.
pub const PARTICIPANT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 16;
const SLOT_SIZE: usize = 32;
const TABLE_SIZE: usize = HEADER_SIZE + PARTICIPANT_SLOTS * SLOT_SIZE;

// Slot field offsets.
const SLOT_PID: usize = 0;
const SLOT_START: usize = 4;
const SLOT_HEARTBEAT: usize = 12;
const SLOT_LOCK_TYPE: usize = 20;
const SLOT_ACTIVE: usize = 21;

/// One live-process record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Operating-system process id
    pub pid: u32,
    /// When the process attached (ms since epoch)
    pub start_time: i64,
    /// Last heartbeat (ms since epoch)
    pub last_heartbeat: i64,
    /// Lock mode the process declared (0 shared, 1 exclusive)
    pub lock_type: u8,
}

/// Attached view of the participant table.
#[derive(Debug)]
pub struct ParticipantTable {
    mmap: MmapMut,
    path: PathBuf,
    heartbeat_timeout_ms: i64,
    my_slot: Option<usize>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ParticipantTable {
    /// Table file for a data directory: `nendb_shm_<hash>.mem`, the hash
    /// taken over the canonicalized path.
    pub fn table_path(data_dir: &Path) -> PathBuf {
        let canonical = data_dir
            .canonicalize()
            .unwrap_or_else(|_| data_dir.to_path_buf());
        let mut hash = 0u64;
        for b in canonical.to_string_lossy().as_bytes() {
            hash = mix64(hash ^ *b as u64);
        }
        data_dir.join(format!("nendb_shm_{hash:016x}.mem"))
    }

    /// Attach to (creating and initialising if absent) the table for
    /// `data_dir`.
    pub fn attach(data_dir: &Path, heartbeat_timeout_ms: i64) -> Result<Self> {
        let path = Self::table_path(data_dir);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        file.set_len(TABLE_SIZE as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut table = ParticipantTable {
            mmap,
            path,
            heartbeat_timeout_ms,
            my_slot: None,
        };
        let magic = LittleEndian::read_u32(&table.mmap[0..4]);
        if magic != PARTICIPANT_MAGIC {
            // First attacher initialises the table.
            table.mmap[..].fill(0);
            LittleEndian::write_u32(&mut table.mmap[0..4], PARTICIPANT_MAGIC);
            LittleEndian::write_u16(&mut table.mmap[4..6], PARTICIPANT_VERSION);
            LittleEndian::write_u32(&mut table.mmap[6..10], 0);
        } else {
            let version = LittleEndian::read_u16(&table.mmap[4..6]);
            if version != PARTICIPANT_VERSION {
                return Err(Error::CorruptedData(format!(
                    "participant table version {version}, expected {PARTICIPANT_VERSION}"
                )));
            }
        }
        Ok(table)
    }

    fn slot(&self, i: usize) -> &[u8] {
        let start = HEADER_SIZE + i * SLOT_SIZE;
        &self.mmap[start..start + SLOT_SIZE]
    }

    fn slot_mut(&mut self, i: usize) -> &mut [u8] {
        let start = HEADER_SIZE + i * SLOT_SIZE;
        &mut self.mmap[start..start + SLOT_SIZE]
    }

    fn slot_active(&self, i: usize) -> bool {
        self.slot(i)[SLOT_ACTIVE] != 0
    }

    fn recount(&mut self) {
        let live = (0..PARTICIPANT_SLOTS)
            .filter(|&i| self.slot_active(i))
            .count() as u32;
        LittleEndian::write_u32(&mut self.mmap[6..10], live);
    }

    /// Claim a slot for this process.
    ///
    /// Stale slots are reclaimed first. `lock_type` is 0 for shared, 1
    /// for exclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when all slots stay live.
    pub fn register(&mut self, lock_type: u8) -> Result<usize> {
        self.reclaim_stale();
        let now = now_millis();
        let free = (0..PARTICIPANT_SLOTS).find(|&i| !self.slot_active(i));
        let Some(i) = free else {
            return Err(Error::PoolExhausted {
                kind: PoolKind::Participant,
                capacity: PARTICIPANT_SLOTS as u32,
            });
        };
        let pid = std::process::id();
        let slot = self.slot_mut(i);
        LittleEndian::write_u32(&mut slot[SLOT_PID..SLOT_PID + 4], pid);
        LittleEndian::write_i64(&mut slot[SLOT_START..SLOT_START + 8], now);
        LittleEndian::write_i64(&mut slot[SLOT_HEARTBEAT..SLOT_HEARTBEAT + 8], now);
        slot[SLOT_LOCK_TYPE] = lock_type;
        slot[SLOT_ACTIVE] = 1;
        self.my_slot = Some(i);
        self.recount();
        Ok(i)
    }

    /// Refresh this process's heartbeat.
    pub fn heartbeat(&mut self) {
        if let Some(i) = self.my_slot {
            let now = now_millis();
            let slot = self.slot_mut(i);
            LittleEndian::write_i64(&mut slot[SLOT_HEARTBEAT..SLOT_HEARTBEAT + 8], now);
        }
    }

    /// Clear slots whose heartbeat is older than the timeout. Returns
    /// how many were reclaimed.
    pub fn reclaim_stale(&mut self) -> u32 {
        let now = now_millis();
        let timeout = self.heartbeat_timeout_ms;
        let mut reclaimed = 0u32;
        for i in 0..PARTICIPANT_SLOTS {
            if !self.slot_active(i) {
                continue;
            }
            let beat = LittleEndian::read_i64(&self.slot(i)[SLOT_HEARTBEAT..SLOT_HEARTBEAT + 8]);
            if now.saturating_sub(beat) > timeout {
                let pid = LittleEndian::read_u32(&self.slot(i)[SLOT_PID..SLOT_PID + 4]);
                tracing::warn!(
                    target: "nendb::process",
                    slot = i,
                    pid = pid,
                    stale_ms = now - beat,
                    "reclaiming participant slot with stale heartbeat"
                );
                self.slot_mut(i).fill(0);
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            self.recount();
        }
        reclaimed
    }

    /// Release this process's slot.
    pub fn deregister(&mut self) {
        if let Some(i) = self.my_slot.take() {
            self.slot_mut(i).fill(0);
            self.recount();
        }
    }

    /// All currently active records.
    pub fn live_participants(&self) -> Vec<ParticipantInfo> {
        (0..PARTICIPANT_SLOTS)
            .filter(|&i| self.slot_active(i))
            .map(|i| {
                let slot = self.slot(i);
                ParticipantInfo {
                    pid: LittleEndian::read_u32(&slot[SLOT_PID..SLOT_PID + 4]),
                    start_time: LittleEndian::read_i64(&slot[SLOT_START..SLOT_START + 8]),
                    last_heartbeat: LittleEndian::read_i64(
                        &slot[SLOT_HEARTBEAT..SLOT_HEARTBEAT + 8],
                    ),
                    lock_type: slot[SLOT_LOCK_TYPE],
                }
            })
            .collect()
    }

    /// Header process count.
    pub fn process_count(&self) -> u32 {
        LittleEndian::read_u32(&self.mmap[6..10])
    }

    /// Path of the mapped file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ParticipantTable {
    fn drop(&mut self) {
        self.deregister();
        let _ = self.mmap.flush();
    }
}
