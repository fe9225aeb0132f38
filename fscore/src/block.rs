//! The cached disk block (reference spec §3, "Block buffer (B)").

use alloc::vec::Vec;

use crate::overlap::{BitIndex, ByteIndex};
use crate::patch::MAX_LEVELS;
use crate::id::PatchId;

/// A cached disk block and the bookkeeping the patch graph needs to
/// find, order and retire the patches that modify it.
#[derive(Debug, Clone)]
pub struct Block {
    pub number: u64,
    pub length: u32,
    pub data: Vec<u8>,
    /// References held by callers outside the patch graph (mounted
    /// file handles, a pinned cache entry, ...). The block is only
    /// eligible for retirement once this and `all_patches` are both
    /// empty (reference spec §3).
    pub refcount: u32,
    /// Every live (non-WRITTEN, non-destroyed) patch on this block,
    /// most-recent-first.
    pub all_patches: Vec<PatchId>,
    /// Patches on this block indexed by level, mirroring the
    /// `index_patches` sub-list of the reference implementation.
    pub index_patches: [Vec<PatchId>; MAX_LEVELS],
    /// The subset of `index_patches` that is currently ready
    /// (`nbefores[L] == 0` for all `L` below the patch's level).
    pub ready_patches: [Vec<PatchId>; MAX_LEVELS],
    pub byte_index: ByteIndex,
    pub bit_index: BitIndex,
    /// The block's non-rollbackable patch, if any (invariant 5: at
    /// most one per block). Weakly held: cleared automatically when
    /// the NRB is satisfied or destroyed via `WeakChain`.
    pub nrb: Option<PatchId>,
    /// Count of non-INFLIGHT patches on *other* blocks whose befores
    /// transitively lead to a patch on this block (reference spec
    /// §4.6).
    pub extern_after_count: u32,
}

impl Block {
    pub fn new(number: u64, length: u32, data: Vec<u8>) -> Self {
        assert!(length.is_power_of_two(), "block length must be a power of two");
        assert_eq!(data.len(), length as usize, "block data must match declared length");
        Self {
            number,
            length,
            data,
            refcount: 0,
            all_patches: Vec::new(),
            index_patches: core::array::from_fn(|_| Vec::new()),
            ready_patches: core::array::from_fn(|_| Vec::new()),
            byte_index: ByteIndex::new(length),
            bit_index: BitIndex::default(),
            nrb: None,
            extern_after_count: 0,
        }
    }

    /// True once this block holds no live patches and no external
    /// references; callers drop it from their cache at that point.
    pub fn is_retirable(&self) -> bool {
        self.refcount == 0 && self.all_patches.is_empty()
    }

    pub fn has_external_afters(&self) -> bool {
        self.extern_after_count > 0
    }

    pub(crate) fn link_all(&mut self, patch: PatchId) {
        self.all_patches.insert(0, patch);
    }

    pub(crate) fn unlink_all(&mut self, patch: PatchId) {
        if let Some(pos) = self.all_patches.iter().position(|&p| p == patch) {
            self.all_patches.remove(pos);
        }
    }

    pub(crate) fn link_index(&mut self, level: u16, patch: PatchId) {
        self.index_patches[level as usize % MAX_LEVELS].push(patch);
    }

    pub(crate) fn unlink_index(&mut self, level: u16, patch: PatchId) {
        let list = &mut self.index_patches[level as usize % MAX_LEVELS];
        if let Some(pos) = list.iter().position(|&p| p == patch) {
            list.swap_remove(pos);
        }
    }

    pub(crate) fn link_ready(&mut self, level: u16, patch: PatchId) {
        let list = &mut self.ready_patches[level as usize % MAX_LEVELS];
        if !list.contains(&patch) {
            list.push(patch);
        }
    }

    pub(crate) fn unlink_ready(&mut self, level: u16, patch: PatchId) {
        let list = &mut self.ready_patches[level as usize % MAX_LEVELS];
        if let Some(pos) = list.iter().position(|&p| p == patch) {
            list.swap_remove(pos);
        }
    }

    /// Every ready patch on this block across all levels, in no
    /// particular order.
    pub fn ready_iter(&self) -> impl Iterator<Item = PatchId> + '_ {
        self.ready_patches.iter().flatten().copied()
    }
}
