//! Named tunables (reference implementation §9).
//!
//! The original source gates each of these behind a compile-time
//! `#define`. The teacher has no config-file crate anywhere in its
//! dependency tree (its own tunables are Cargo features), so the direct
//! idiomatic-Rust analogue is a plain struct passed to
//! [`crate::engine::PatchGraph::new`] rather than introducing a config
//! crate this domain has no use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Permit parallel edges between the same two patches instead of
    /// deduplicating with a linear scan.
    pub allow_multigraph: bool,
    /// Enable the non-rollbackable patch optimization.
    pub nrb: bool,
    /// When creating an NRB, rewrite existing rollbackable patches on
    /// the same block into EMPTYs depending on the NRB.
    pub merge_rbs_into_nrb: bool,
    /// Simple BYTE overlap merging.
    pub byte_merge_overlap: bool,
    /// Simple BIT overlap merging.
    pub bit_merge_overlap: bool,
    /// Batched overlap discovery variant (collect all overlappers via
    /// the fine offset buckets before deciding whether to merge or
    /// wire edges, instead of re-scanning per candidate).
    pub overlaps_v2: bool,
    /// Roll back a full-block BYTE patch by swapping the block's data
    /// pointer instead of copying.
    pub swap_fullblock_data: bool,
    /// Run the debug DFS cycle check on every `add_depend`.
    pub cycle_check: bool,
    /// Maintain the lightweight accounting counters in `engine::Stats`.
    pub account: bool,
    /// Depth reservation for the explicit recursion-on-the-heap frame
    /// stack used by level propagation and cycle checks.
    pub recursion_reserve: usize,
    /// If `Some`, the frame stack used by recursion-on-the-heap panics
    /// instead of growing past this many frames. `None` (the default)
    /// lets it grow unbounded, same as the reference implementation's
    /// `HEAP_RECURSION_ALLOW_MALLOC`.
    pub recursion_hard_cap: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_multigraph: true,
            nrb: true,
            merge_rbs_into_nrb: true,
            byte_merge_overlap: true,
            bit_merge_overlap: true,
            overlaps_v2: true,
            swap_fullblock_data: false,
            cycle_check: cfg!(debug_assertions),
            account: false,
            recursion_reserve: 1024,
            recursion_hard_cap: None,
        }
    }
}
