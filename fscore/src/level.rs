//! Patch level computation and before/ready-state propagation
//! (reference spec §4.6).
//!
//! A patch's level is how many device layers still stand between it
//! and stable storage. Owned patches derive theirs from their owning
//! device (bumped by one while in flight, so afters stop following
//! them); free-floating EMPTY patches have no owner and instead cache
//! the max level over their direct befores, kept current by
//! [`propagate_level_change`] whenever a before is added, removed, or
//! itself changes level.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::block::Block;
use crate::dep::EdgeArena;
use crate::device::DeviceId;
use crate::id::{Arena, BlockId, PatchId};
use crate::patch::Patch;

/// The level of `patch`, or `None` (reference `BDLEVEL_NONE`) if it is
/// a free EMPTY with no before that has a level yet.
pub fn level(patches: &Arena<PatchId, Patch>, devices: &BTreeMap<DeviceId, u16>, patch: PatchId) -> Option<u16> {
    let p = patches.get(patch)?;
    match p.owner {
        Some(dev) => {
            let base = *devices.get(&dev)?;
            Some(if p.is_inflight() { base + 1 } else { base })
        }
        None => p.level_cache,
    }
}

fn is_free(patches: &Arena<PatchId, Patch>, patch: PatchId) -> bool {
    patches.get(patch).map(|p| p.owner.is_none()).unwrap_or(false)
}

/// Recompute a free EMPTY's level as the max over its direct befores'
/// levels (reference `patch_level`'s free-patch case).
fn recompute_free_level(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    devices: &BTreeMap<DeviceId, u16>,
    patch: PatchId,
) -> Option<u16> {
    let p = patches.get(patch)?;
    p.before_edges
        .iter()
        .filter_map(|&e| edges.get(e))
        .filter_map(|e| level(patches, devices, e.before))
        .max()
}

/// Move `patch` between its block's index and ready sub-lists
/// depending on whether it is currently ready at its own level
/// (reference `patch_update_ready_patches`). No-op for patches not on
/// a block.
pub(crate) fn update_ready_patches(
    patches: &Arena<PatchId, Patch>,
    blocks: &mut Arena<BlockId, Block>,
    devices: &BTreeMap<DeviceId, u16>,
    patch: PatchId,
) {
    let Some(p) = patches.get(patch) else { return };
    let Some(block_id) = p.block else { return };
    let Some(own_level) = level(patches, devices, patch) else { return };
    let Some(block) = blocks.get_mut(block_id) else { return };
    if p.is_ready_at(own_level) {
        block.link_ready(own_level, patch);
    } else {
        block.unlink_ready(own_level, patch);
    }
}

/// Propagate a level change on `patch` (from `prev_level` to
/// `new_level`) to every direct after: adjust its `nbefores` counters
/// for the two levels, refresh its ready state, and -- if that after
/// is itself a free EMPTY whose own level consequently changes --
/// continue the propagation through it (reference
/// `propagate_level_change_thru_empty` / `patch_propagate_level_change`).
/// Runs over an explicit stack rather than native recursion so a deep
/// chain of EMPTY patches cannot blow the call stack.
pub(crate) fn propagate_level_change(
    patches: &mut Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    devices: &BTreeMap<DeviceId, u16>,
    patch: PatchId,
    prev_level: Option<u16>,
    new_level: Option<u16>,
) {
    if prev_level == new_level {
        return;
    }
    let mut stack: Vec<(PatchId, Option<u16>, Option<u16>)> = alloc::vec![(patch, prev_level, new_level)];
    while let Some((node, prev, new)) = stack.pop() {
        let afters: Vec<PatchId> = match patches.get(node) {
            Some(p) => p.after_edges.iter().filter_map(|&e| edges.get(e)).map(|e| e.after).collect(),
            None => continue,
        };
        for after in afters {
            let after_prev_level = level(patches, devices, after);

            if let Some(pl) = prev {
                if let Some(ap) = patches.get_mut(after) {
                    ap.nbefores[pl as usize] = ap.nbefores[pl as usize].saturating_sub(1);
                }
            }
            if let Some(nl) = new {
                if let Some(ap) = patches.get_mut(after) {
                    ap.nbefores[nl as usize] += 1;
                }
            }
            update_ready_patches(patches, blocks, devices, after);

            if is_free(patches, after) {
                let after_new_level = recompute_free_level(patches, edges, devices, after);
                if let Some(ap) = patches.get_mut(after) {
                    ap.level_cache = after_new_level;
                }
                if after_prev_level != after_new_level {
                    stack.push((after, after_prev_level, after_new_level));
                }
            }
        }
    }
}

/// Update `nbefores`/ready state and, if needed, cascade a level
/// change after a `before` edge is added to `after` (reference
/// `propagate_depend_add`'s non-extern-after half).
pub(crate) fn on_depend_added(
    patches: &mut Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    devices: &BTreeMap<DeviceId, u16>,
    after: PatchId,
    before: PatchId,
) {
    let Some(before_level) = level(patches, devices, before) else { return };
    let after_prev_level = level(patches, devices, after);

    if let Some(ap) = patches.get_mut(after) {
        ap.nbefores[before_level as usize] += 1;
    }
    update_ready_patches(patches, blocks, devices, after);

    if is_free(patches, after) && (after_prev_level.is_none() || before_level > after_prev_level.unwrap()) {
        let after_new_level = recompute_free_level(patches, edges, devices, after);
        if let Some(ap) = patches.get_mut(after) {
            ap.level_cache = after_new_level;
        }
        propagate_level_change(patches, edges, blocks, devices, after, after_prev_level, after_new_level);
    }
}

/// Update `nbefores`/ready state and, if needed, cascade a level
/// change after a `before` edge is removed from `after` (reference
/// `propagate_depend_remove`'s non-extern-after half).
pub(crate) fn on_depend_removed(
    patches: &mut Arena<PatchId, Patch>,
    edges: &EdgeArena,
    blocks: &mut Arena<BlockId, Block>,
    devices: &BTreeMap<DeviceId, u16>,
    after: PatchId,
    before: PatchId,
) {
    let Some(before_level) = level(patches, devices, before) else { return };
    let after_prev_level = level(patches, devices, after);

    if let Some(ap) = patches.get_mut(after) {
        ap.nbefores[before_level as usize] = ap.nbefores[before_level as usize].saturating_sub(1);
    }
    update_ready_patches(patches, blocks, devices, after);

    let now_zero = patches.get(after).map(|p| p.nbefores[before_level as usize] == 0).unwrap_or(false);
    if is_free(patches, after) && after_prev_level == Some(before_level) && now_zero {
        let after_new_level = recompute_free_level(patches, edges, devices, after);
        if let Some(ap) = patches.get_mut(after) {
            ap.level_cache = after_new_level;
        }
        propagate_level_change(patches, edges, blocks, devices, after, after_prev_level, after_new_level);
    }
}
