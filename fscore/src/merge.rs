//! Overlap merging (reference spec §4.1 step 3, §4.3).
//!
//! A newly requested BYTE or BIT write is folded into an existing live
//! patch on the same block whenever that is safe, instead of becoming
//! a new patch of its own. Merging keeps the dependency graph small:
//! fewer patches means fewer edges to track and a shorter path to
//! WRITTEN. A merge is only taken when it cannot introduce a cycle
//! (reference `patch_create_byte_merge_overlap2`'s before-safety scan,
//! backed by [`crate::cycle`]).

use alloc::vec::Vec;

use crate::block::Block;
use crate::config::Config;
use crate::cycle;
use crate::dep::EdgeArena;
use crate::id::{Arena, BlockId, PatchId};
use crate::overlap::{bit_overlap, byte_overlap, ByteOverlap};
use crate::patch::{Patch, PatchKind};

/// Outcome of attempting to fold a new BYTE write into an existing
/// patch instead of allocating a fresh one.
pub struct ByteMerge {
    /// The existing patch that absorbed the write.
    pub into: PatchId,
    /// Its new, possibly widened, byte range.
    pub offset: u16,
    pub length: u16,
    /// Its new rollback buffer, covering `offset..offset+length`.
    pub rollback: Vec<u8>,
}

/// True iff merging `after` to additionally depend on every patch in
/// `explicit_befores` cannot create a cycle, per the cheap checks
/// backed by a bounded search (reference: `quick_depends_on` /
/// `quick_befores_subset` ahead of `patch_may_have_before`).
pub(crate) fn merge_is_cycle_safe(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    after: PatchId,
    explicit_befores: &[PatchId],
) -> bool {
    explicit_befores.iter().all(|&before| {
        before == after
            || cycle::quick_depends_on(patches, edges, after, before)
            || cycle::quick_befores_subset(patches, edges, before, after)
            || !cycle::would_cycle(patches, edges, after, before)
    })
}

/// Look for a live, rollbackable BYTE patch on `block_id` whose range
/// overlaps `[new_offset, new_offset+new_length)` and that can safely
/// absorb the new write plus `explicit_befores`. Returns the merge
/// plan without mutating anything; the caller applies it (and wires
/// the explicit befores in) only once it has also decided there is no
/// cheaper NRB path.
pub fn find_byte_merge(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &Arena<BlockId, Block>,
    config: &Config,
    block_id: BlockId,
    new_offset: u16,
    new_length: u16,
    explicit_befores: &[PatchId],
) -> Option<ByteMerge> {
    if !config.byte_merge_overlap {
        return None;
    }
    let block = blocks.get(block_id)?;
    for candidate in block.byte_index.candidates(new_offset, new_length) {
        let Some(old) = patches.get(candidate) else { continue };
        if old.is_written() || old.is_inflight() || old.is_freeing() {
            continue;
        }
        let Some((old_offset, old_length)) = old.byte_range() else { continue };
        if old.is_nrb() {
            continue;
        }
        if byte_overlap(new_offset, new_length, old_offset, old_length) == ByteOverlap::Disjoint {
            continue;
        }
        if !merge_is_cycle_safe(patches, edges, candidate, explicit_befores) {
            continue;
        }

        let merge_offset = new_offset.min(old_offset);
        let merge_end = (new_offset as u32 + new_length as u32).max(old_offset as u32 + old_length as u32);
        let merge_length = (merge_end - merge_offset as u32) as u16;

        let PatchKind::Byte { rollback: Some(old_rollback), .. } = &old.kind else { continue };
        let mut merged = Vec::with_capacity(merge_length as usize);
        for off in merge_offset..(merge_offset as u32 + merge_length as u32) as u16 {
            let byte = if off >= old_offset && (off as u32) < old_offset as u32 + old_length as u32 {
                old_rollback[(off - old_offset) as usize]
            } else {
                block.data[off as usize]
            };
            merged.push(byte);
        }

        return Some(ByteMerge { into: candidate, offset: merge_offset, length: merge_length, rollback: merged });
    }
    None
}

/// Look for a live BIT patch already grouped at `word_offset` whose
/// `or` mask can absorb `xor`/`or` without a bit collision (invariant
/// 7: distinct BIT patches on one word keep disjoint claimed bits).
pub fn find_bit_merge(
    patches: &Arena<PatchId, Patch>,
    blocks: &Arena<BlockId, Block>,
    config: &Config,
    block_id: BlockId,
    word_offset: u16,
    _xor: u32,
    or: u32,
) -> Option<PatchId> {
    if !config.bit_merge_overlap {
        return None;
    }
    let block = blocks.get(block_id)?;
    block.bit_index.group_for(word_offset)?;
    for &candidate in &block.all_patches {
        let Some(p) = patches.get(candidate) else { continue };
        if p.is_written() || p.is_inflight() {
            continue;
        }
        if let PatchKind::Bit { word_offset: w, or: existing_or, .. } = &p.kind {
            if *w == word_offset && !bit_overlap(word_offset, *existing_or, word_offset, or) {
                return Some(candidate);
            }
        }
    }
    None
}
