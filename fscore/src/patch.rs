//! The patch record itself (reference spec §3, "Patch (P)").

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::device::DeviceId;
use crate::id::{BlockId, EdgeId, PatchId};
use crate::weak::WeakChain;

/// Upper bound on device-stack depth used to size the per-level
/// `nbefores` counters. The reference implementation's `NBDLEVEL` is a
/// build-time constant of the same kind; 8 comfortably covers every
/// stack in the original modules (cache / journal / filesystem / loop).
pub const MAX_LEVELS: usize = 8;

bitflags! {
    /// Patch state and role flags (reference spec §3).
    #[derive(Default)]
    pub struct PatchFlags: u16 {
        /// Set transiently while constructing a patch to permit
        /// `add_depend` to target it even though it isn't yet a
        /// bare EMPTY with no afters.
        const SAFE_AFTER     = 1 << 0;
        /// Write has been issued, not yet acknowledged.
        const INFLIGHT       = 1 << 1;
        /// Write has been acknowledged; no longer participates in the
        /// graph.
        const WRITTEN        = 1 << 2;
        /// The block's bytes currently hold this BYTE/BIT patch's
        /// pre-modification content.
        const ROLLBACK       = 1 << 3;
        /// Set transiently on a new patch while it still needs its
        /// overlap-derived edges restored after a merge decision.
        const OVERLAP        = 1 << 4;
        /// Re-entrancy guard for `destroy`.
        const FREEING         = 1 << 5;
        /// This EMPTY is a transient befores-set container: `add_depend`
        /// recurses into its befores rather than depending on it
        /// directly.
        const SET_EMPTY       = 1 << 6;
        /// This EMPTY collects all BIT patches at one word offset of a
        /// block (see `overlap::BitIndex`).
        const BIT_EMPTY       = 1 << 7;
        /// Exempt from being folded into a caller's default patchgroup
        /// (mirrors the reference implementation's opt-out flag; carried
        /// for API completeness, patchgroups themselves are a client
        /// concern outside this crate).
        const NO_PATCHGROUP   = 1 << 8;
        /// Set on a newly created patch that was found to fully cover
        /// (not merge into) at least one existing overlapper.
        const FULLOVERLAP     = 1 << 9;
        /// Scratch flag for traversals (cycle search, level
        /// propagation) to avoid revisiting a patch within one call.
        const MARKED          = 1 << 10;
    }
}

/// The three patch variants (reference spec §3).
#[derive(Debug, Clone)]
pub enum PatchKind {
    /// A contiguous byte-range write.
    Byte {
        offset: u16,
        length: u16,
        /// Pre-modification bytes, or `None` for a non-rollbackable
        /// (NRB) patch. An NRB must cover the entire block.
        rollback: Option<Vec<u8>>,
        /// Optional corruption-detection fingerprints (reference
        /// spec §4.5); `None` unless accounting is enabled.
        old_sum: Option<u32>,
        new_sum: Option<u32>,
    },
    /// A 32-bit-word XOR toggle.
    Bit {
        word_offset: u16,
        /// Bits this patch flips.
        xor: u32,
        /// Bits this patch claims; two BIT patches at the same word
        /// must keep disjoint `or` masks (invariant 7).
        or: u32,
    },
    /// A payload-free join/fork/collector node.
    Empty,
}

impl PatchKind {
    pub fn is_byte(&self) -> bool {
        matches!(self, PatchKind::Byte { .. })
    }

    pub fn is_bit(&self) -> bool {
        matches!(self, PatchKind::Bit { .. })
    }

    pub fn is_empty_kind(&self) -> bool {
        matches!(self, PatchKind::Empty)
    }
}

/// A single addressable block modification.
#[derive(Debug, Clone)]
pub struct Patch {
    pub kind: PatchKind,
    pub owner: Option<DeviceId>,
    pub block: Option<BlockId>,
    pub flags: PatchFlags,
    /// Edges where this patch is the "after" endpoint (things this
    /// patch depends on).
    pub before_edges: Vec<EdgeId>,
    /// Edges where this patch is the "before" endpoint (things that
    /// depend on this patch).
    pub after_edges: Vec<EdgeId>,
    /// Outstanding not-yet-WRITTEN befores, indexed by level.
    pub nbefores: [u32; MAX_LEVELS],
    /// Cached level of a free-floating EMPTY (`owner.is_none()`): the
    /// max level over its direct befores, or `None` (reference
    /// `BDLEVEL_NONE`) if none of them has a level yet. Unused and left
    /// `None` for owned patches, whose level is instead derived on
    /// demand from their owning device (`level::level`).
    pub level_cache: Option<u16>,
    pub weak: WeakChain,
    /// Scratch list membership used by traversals; not persisted
    /// between calls.
    pub tmp_marked: bool,
}

impl Patch {
    pub(crate) fn new(kind: PatchKind, owner: Option<DeviceId>, block: Option<BlockId>) -> Self {
        Self {
            kind,
            owner,
            block,
            flags: PatchFlags::empty(),
            before_edges: Vec::new(),
            after_edges: Vec::new(),
            nbefores: [0; MAX_LEVELS],
            level_cache: None,
            weak: WeakChain::default(),
            tmp_marked: false,
        }
    }

    pub fn is_written(&self) -> bool {
        self.flags.contains(PatchFlags::WRITTEN)
    }

    pub fn is_inflight(&self) -> bool {
        self.flags.contains(PatchFlags::INFLIGHT)
    }

    pub fn is_rolled_back(&self) -> bool {
        self.flags.contains(PatchFlags::ROLLBACK)
    }

    pub fn is_freeing(&self) -> bool {
        self.flags.contains(PatchFlags::FREEING)
    }

    /// True once every level strictly below this patch's own level has
    /// zero outstanding befores (invariant 3).
    pub fn is_ready_at(&self, own_level: u16) -> bool {
        let own = own_level as usize;
        self.nbefores.iter().take(own.min(MAX_LEVELS)).all(|&n| n == 0)
    }

    /// Non-rollbackable: a BYTE patch whose `data` slot is `None`.
    pub fn is_nrb(&self) -> bool {
        matches!(&self.kind, PatchKind::Byte { rollback: None, .. })
    }

    pub fn byte_range(&self) -> Option<(u16, u16)> {
        match &self.kind {
            PatchKind::Byte { offset, length, .. } => Some((*offset, *length)),
            _ => None,
        }
    }
}
