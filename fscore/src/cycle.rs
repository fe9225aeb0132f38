//! Cycle avoidance (reference spec §4.4).
//!
//! The default construction path assumes no cycle because every new
//! patch is created later, in logical time, than its befores. Two
//! cheaper checks (`quick_depends_on`, `quick_befores_subset`) let the
//! common merge case skip the bounded search entirely (reference
//! `patch.c`'s `quick_depends_on`/`quick_befores_subset`, used ahead of
//! `patch_may_have_before`); a bounded width/depth-limited search
//! (`would_cycle`) backstops the merge path; a full DFS
//! (`debug_find_cycle`) is available for the optional strict/debug
//! mode and reports the offending path.

use alloc::vec::Vec;

use crate::dep::EdgeArena;
use crate::id::{Arena, PatchId};
use crate::patch::Patch;

/// Default search bounds for [`would_cycle`], matching the reference
/// implementation's `MAX_DEPTH`/`MAX_DIRECT_BEFORES`.
pub const MAX_DEPTH: usize = 10;
pub const MAX_DIRECT_BEFORES: usize = 10;

fn befores_of(patches: &Arena<PatchId, Patch>, edges: &EdgeArena, p: PatchId) -> Vec<PatchId> {
    match patches.get(p) {
        Some(patch) => patch
            .before_edges
            .iter()
            .filter_map(|&e| edges.get(e))
            .map(|e| e.before)
            .collect(),
        None => Vec::new(),
    }
}

/// True iff `after` already has a direct edge to `before`.
pub fn quick_depends_on(patches: &Arena<PatchId, Patch>, edges: &EdgeArena, after: PatchId, before: PatchId) -> bool {
    befores_of(patches, edges, after).contains(&before)
}

/// True iff every one of `candidate`'s direct befores is already a
/// direct before of `target` (a shallow, cheap sufficient condition
/// for "depending on candidate cannot create a new cycle through
/// target").
pub fn quick_befores_subset(patches: &Arena<PatchId, Patch>, edges: &EdgeArena, candidate: PatchId, target: PatchId) -> bool {
    let target_befores = befores_of(patches, edges, target);
    befores_of(patches, edges, candidate).iter().all(|b| target_befores.contains(b))
}

/// Conservative bounded search: would adding an edge `after -> before`
/// create a cycle? A cycle exists iff `before` can already reach
/// `after` through existing before-edges (`before` transitively
/// depends on `after`, so the new edge would close a loop); the search
/// therefore walks `before`'s befores looking for `after`,
/// width- and depth-limited, returning `true` (refuse the merge) the
/// moment the bound is exceeded, since an unexplored subtree might
/// hide the target (reference `patch_may_have_before`: "conservatively
/// returning might-depend-on when in doubt").
pub fn would_cycle(patches: &Arena<PatchId, Patch>, edges: &EdgeArena, after: PatchId, before: PatchId) -> bool {
    fn recurse(
        patches: &Arena<PatchId, Patch>,
        edges: &EdgeArena,
        from: PatchId,
        target: PatchId,
        depth: usize,
    ) -> bool {
        let direct = befores_of(patches, edges, from);
        for (i, &b) in direct.iter().enumerate() {
            if i >= MAX_DIRECT_BEFORES {
                return true;
            }
            if b == target {
                return true;
            }
            if !befores_of(patches, edges, b).is_empty() {
                if depth >= MAX_DEPTH {
                    return true;
                }
                if recurse(patches, edges, b, target, depth + 1) {
                    return true;
                }
            }
        }
        false
    }
    recurse(patches, edges, before, after, 0)
}

/// Full, unbounded DFS from `before` through its befores looking for
/// `after`: a cycle exists iff `before` can already reach `after`, so
/// the new edge `after -> before` would close a loop. Returns the path
/// (`before` first, `after` last) if one exists. Used to validate
/// merges under the strict/debug configuration (`Config::cycle_check`)
/// and as an assertion aid; the construction path itself never calls
/// this by default.
pub fn debug_find_cycle(
    patches: &Arena<PatchId, Patch>,
    edges: &EdgeArena,
    after: PatchId,
    before: PatchId,
) -> Option<Vec<PatchId>> {
    // Explicit heap-backed stack: recursion-on-the-heap per the
    // reference implementation's convention (SPEC_FULL.md §5), rather
    // than native recursion, so arbitrarily deep graphs can't blow the
    // call stack.
    let mut stack: Vec<(PatchId, usize)> = alloc::vec![(before, 0)];
    let mut path: Vec<PatchId> = Vec::new();
    let mut visiting: Vec<PatchId> = Vec::new();

    while let Some((node, child_idx)) = stack.pop() {
        if child_idx == 0 {
            path.push(node);
            visiting.push(node);
            if node == after && path.len() > 1 {
                return Some(path);
            }
        }
        let children = befores_of(patches, edges, node);
        if child_idx < children.len() {
            stack.push((node, child_idx + 1));
            let next = children[child_idx];
            if !visiting.contains(&next) {
                stack.push((next, 0));
            } else if next == after {
                path.push(next);
                return Some(path);
            }
        } else {
            path.pop();
            visiting.pop();
        }
    }
    None
}
