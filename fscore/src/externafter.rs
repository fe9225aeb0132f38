//! External-after accounting (reference spec §4.6, `BDESC_EXTERN_AFTER_COUNT`).
//!
//! `Block::extern_after_count` tracks how many non-in-flight patches on
//! *other* blocks transitively depend on a patch living on this block.
//! A block with zero external afters is safe to start a fresh
//! non-rollbackable merge on, since nothing outside it is waiting on
//! its current content. The count is kept current incrementally as
//! edges are added and removed, propagating through chains of
//! free-floating EMPTY patches exactly as the direct, on-block case
//! does.

use alloc::vec::Vec;

use crate::block::Block;
use crate::dep::EdgeArena;
use crate::id::{Arena, BlockId, PatchId};
use crate::patch::{Patch, PatchFlags};

/// True iff `patch` lives on a block other than `block` (an EMPTY with
/// no block at all is never external, and is not itself counted --
/// only the non-EMPTY patches reachable through it are).
fn is_external(patches: &Arena<PatchId, Patch>, patch: PatchId, block: BlockId) -> bool {
    match patches.get(patch) {
        Some(p) => match p.block {
            Some(b) => b != block,
            None => false,
        },
        None => false,
    }
}

/// Walk every after of a free `empty_after` (reference
/// `propagate_extern_after_change_thru_empty_after`), recursing through
/// further free EMPTYs, adjusting `block`'s `extern_after_count` for
/// every on-block after found external to `block`.
fn propagate_thru_empty_after(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    empty_after: PatchId,
    block: BlockId,
    add: bool,
) {
    let mut stack: Vec<PatchId> = alloc::vec![empty_after];
    while let Some(node) = stack.pop() {
        let afters: Vec<PatchId> = match patches.get(node) {
            Some(p) => p.after_edges.iter().filter_map(|&e| edges.get(e)).map(|e| e.after).collect(),
            None => continue,
        };
        for after in afters {
            let Some(ap) = patches.get(after) else { continue };
            match ap.block {
                None => stack.push(after),
                Some(b) if b != block => {
                    if let Some(blk) = blocks.get_mut(block) {
                        bump(&mut blk.extern_after_count, add);
                    }
                }
                Some(_) => {}
            }
        }
    }
}

/// Walk every before of a free `empty_before` (reference
/// `propagate_extern_after_change_thru_empty_before`), recursing
/// through further free EMPTYs, adjusting each on-block before's own
/// block's `extern_after_count` when `after` is external to it.
fn propagate_thru_empty_before(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    empty_before: PatchId,
    after: PatchId,
    add: bool,
) {
    let mut stack: Vec<PatchId> = alloc::vec![empty_before];
    while let Some(node) = stack.pop() {
        let befores: Vec<PatchId> = match patches.get(node) {
            Some(p) => p.before_edges.iter().filter_map(|&e| edges.get(e)).map(|e| e.before).collect(),
            None => continue,
        };
        for before in befores {
            let Some(bp) = patches.get(before) else { continue };
            match bp.block {
                None => stack.push(before),
                Some(b) => {
                    let inflight = bp.flags.contains(PatchFlags::INFLIGHT);
                    if !inflight && is_external(patches, after, b) {
                        if let Some(blk) = blocks.get_mut(b) {
                            bump(&mut blk.extern_after_count, add);
                        }
                    }
                }
            }
        }
    }
}

fn bump(count: &mut u32, add: bool) {
    if add {
        *count += 1;
    } else {
        debug_assert!(*count > 0);
        *count = count.saturating_sub(1);
    }
}

/// Adjust `extern_after_count` after an `after`-depends-on-`before`
/// edge is added (`add = true`) or removed (`add = false`). Call sites
/// must skip this entirely while `before` is in flight (reference
/// comment: "an inflight patch does not contribute to its block's
/// extern_after_count").
pub(crate) fn propagate_extern_after_change(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    after: PatchId,
    before: PatchId,
    add: bool,
) {
    let after_block = patches.get(after).and_then(|p| p.block);
    let before_block = patches.get(before).and_then(|p| p.block);
    match (after_block, before_block) {
        (None, Some(b)) => propagate_thru_empty_after(patches, edges, blocks, after, b, add),
        (None, None) => {
            // Both ends are free EMPTYs; the reference implementation
            // asserts this combination never needs propagation because
            // one side always lacks on-block reachability by the time
            // it occurs. Nothing to update here.
        }
        (Some(_), None) => propagate_thru_empty_before(patches, edges, blocks, before, after, add),
        (Some(ab), Some(bb)) if ab != bb => {
            if let Some(blk) = blocks.get_mut(bb) {
                bump(&mut blk.extern_after_count, add);
            }
        }
        (Some(_), Some(_)) => {}
    }
}

/// Pre-decrement `extern_after_count` on every block `patch` reports
/// an after onto, just before `patch` is marked in flight, so a fresh
/// non-rollbackable merge may start on its own block immediately
/// (reference spec §4.6 and `patch_set_inflight`).
pub(crate) fn predecrement_for_inflight(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    patch: PatchId,
) {
    let afters: Vec<PatchId> = match patches.get(patch) {
        Some(p) => p.after_edges.iter().filter_map(|&e| edges.get(e)).map(|e| e.after).collect(),
        None => return,
    };
    for after in afters {
        propagate_extern_after_change(patches, edges, blocks, after, patch, false);
    }
}
