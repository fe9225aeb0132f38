//! Dependency edges (reference spec §3 "Dependency edge (D)").
//!
//! The reference implementation allocates/frees edges from a pool and
//! threads them through doubly linked lists on both endpoints so a
//! single edge can be unlinked in O(1) given only its address. We
//! instead arena-allocate edges and record them by id in plain
//! `Vec<EdgeId>` adjacency lists on each patch; removal is O(k) in the
//! patch's degree (typically small — this is the idiomatic-Rust
//! tradeoff documented in SPEC_FULL.md §3).

use crate::id::{Arena, EdgeId, PatchId};

/// One before→after dependency arc. Multiple `Edge`s between the same
/// pair are permitted when `Config::allow_multigraph` is set
/// (reference invariant 2, "a multigraph").
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub after: PatchId,
    pub before: PatchId,
}

pub type EdgeArena = Arena<EdgeId, Edge>;
