//! The block-layer contract the engine is driven from below (reference
//! spec §6, "Block layer contract").
//!
//! Grounded in the teacher's `watos-driver-traits::block::BlockDevice`
//! (geometry + `read_sectors`/`write_sectors`/`flush`), generalized to
//! the stacked-device-level model the reference implementation needs:
//! every device in the stack has a `level()` used for write ordering,
//! and the engine reparents patches between adjacent devices with
//! [`crate::engine::PatchGraph::push_down`].

use alloc::vec::Vec;

use crate::error::FsResult;
use crate::id::PatchId;

/// Identifies a device in the stack a [`PatchGraph`](crate::engine::PatchGraph)
/// is threaded through. Opaque; devices are owned and numbered by the
/// caller, not by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u32);

/// How much of a device's write-back queue a `sync` call should drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScope {
    /// Only the patches already marked ready need to reach disk.
    Ready,
    /// Every patch on the device, including ones still waiting on
    /// befores elsewhere in the stack.
    All,
}

/// A block buffer as exchanged with a device: raw bytes plus the block
/// number they belong to.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub number: u64,
    pub data: Vec<u8>,
}

impl Buffer {
    pub fn new(number: u64, data: Vec<u8>) -> Self {
        Self { number, data }
    }

    pub fn zeroed(number: u64, length: u32) -> Self {
        Self { number, data: alloc::vec![0u8; length as usize] }
    }
}

/// The interface a block device below the engine must provide.
///
/// Default method bodies are intentionally absent: every device in the
/// stack has distinct geometry and write-ordering behavior, so unlike
/// `BlockDeviceExt` in the teacher there is no universal default that
/// would be safe to inherit silently.
pub trait BlockDevice {
    /// Read a block, performing real I/O.
    fn read(&mut self, number: u64) -> FsResult<Buffer>;

    /// Return a zero-filled buffer for `number` without I/O. The block
    /// is "synthetic" until the first write reaches it; callers use
    /// this to synthesize a block a filesystem is about to overwrite
    /// in full rather than reading stale or nonexistent disk content.
    fn synthetic_read(&mut self, number: u64) -> Buffer;

    /// Issue a write for `buffer` at `number`.
    fn write(&mut self, buffer: &Buffer, number: u64) -> FsResult<()>;

    /// Flush/sync the device, draining the given scope of its queue.
    fn sync(&mut self, scope: SyncScope) -> FsResult<()>;

    /// The patch most recently handed to `write`, if the device tracks
    /// one (used by higher layers to chain a barrier after it).
    fn write_head(&self) -> Option<PatchId>;

    /// Free space remaining on the device, in blocks; negative if the
    /// device does not track this.
    fn block_space(&self) -> i32;

    fn blocksize(&self) -> u32;
    fn numblocks(&self) -> u64;
    /// The device's atomic write unit, in bytes. `create_byte_atomic`
    /// splits writes so no single patch straddles this boundary.
    fn atomicsize(&self) -> u16;
    /// Stacking depth used for level-based writeback ordering.
    fn level(&self) -> u16;
    /// Position of this device in the dependency stack, used only for
    /// diagnostics (cycle-check path printing, accounting).
    fn graph_index(&self) -> u32;
}
