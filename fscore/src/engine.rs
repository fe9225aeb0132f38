//! The patch graph context (reference spec §9 "global state").
//!
//! `PatchGraph` owns every arena the engine needs: patches, blocks,
//! edges, and the per-device level table. Every mutating operation
//! takes `&mut PatchGraph`; Rust's borrow checker is the serialization
//! the reference implementation enforces with a single process-wide
//! lock (see [`crate::global`] for an optional singleton wrapper).

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::block::Block;
use crate::config::Config;
use crate::dep::EdgeArena;
use crate::device::DeviceId;
use crate::id::{Arena, BlockId, PatchId};
use crate::patch::Patch;

/// Lightweight counters kept when `Config::account` is set (reference
/// `PATCH_NRB_MERGE_STATS`); otherwise left at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub byte_patches_created: u64,
    pub byte_patches_merged: u64,
    pub nrb_patches_created: u64,
}

/// Owns every patch, block, and edge live in one patch graph, plus the
/// bookkeeping (`device_levels`, the satisfied-EMPTY free list) the
/// operations in [`crate::lifecycle`] need to maintain the graph's
/// invariants.
pub struct PatchGraph {
    pub(crate) patches: Arena<PatchId, Patch>,
    pub(crate) blocks: Arena<BlockId, Block>,
    pub(crate) edges: EdgeArena,
    pub(crate) device_levels: BTreeMap<DeviceId, u16>,
    /// Satisfied EMPTY patches with no remaining afters, awaiting
    /// final reclamation by [`PatchGraph::reclaim_written`] (reference
    /// spec §4.8's process-wide free list).
    pub(crate) free_empties: Vec<PatchId>,
    pub config: Config,
    pub stats: Stats,
}

impl PatchGraph {
    pub fn new(config: Config) -> Self {
        Self {
            patches: Arena::new(),
            blocks: Arena::new(),
            edges: EdgeArena::new(),
            device_levels: BTreeMap::new(),
            free_empties: Vec::new(),
            config,
            stats: Stats::default(),
        }
    }

    /// Record (or update) the device stack level used to compute the
    /// level of every patch owned by `device`.
    pub fn register_device(&mut self, device: DeviceId, level: u16) {
        self.device_levels.insert(device, level);
    }

    /// Bring a block under this graph's management. Returns the id
    /// callers use to address it from then on.
    pub fn insert_block(&mut self, number: u64, length: u32, data: Vec<u8>) -> BlockId {
        self.blocks.insert(Block::new(number, length, data))
    }

    pub fn block(&self, block: BlockId) -> Option<&Block> {
        self.blocks.get(block)
    }

    pub fn patch(&self, patch: PatchId) -> Option<&Patch> {
        self.patches.get(patch)
    }

    /// The patch's level (reference `patch_level`): `None` only for a
    /// free-floating EMPTY with no before that has a level yet.
    pub fn level(&self, patch: PatchId) -> Option<u16> {
        crate::level::level(&self.patches, &self.device_levels, patch)
    }

    /// True once every level below the patch's own has zero
    /// outstanding befores (invariant 3). A patch whose level cannot
    /// yet be determined is never ready.
    pub fn is_ready(&self, patch: PatchId) -> bool {
        match (self.patches.get(patch), self.level(patch)) {
            (Some(p), Some(level)) => p.is_ready_at(level),
            _ => false,
        }
    }
}
