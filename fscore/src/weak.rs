//! Weak references with optional satisfy/destroy callbacks (reference
//! spec §4.7).
//!
//! The reference implementation threads a linked list of holder
//! structs through each patch; a holder stores a pointer-to-pointer
//! plus an optional callback. We keep the same shape but store holders
//! in a `Vec` on the patch itself instead of hand-rolling the list,
//! since nothing outside the patch ever needs to reach a holder by
//! address.

use alloc::vec::Vec;

use crate::id::PatchId;

/// A callback invoked when a weakly-referenced patch is satisfied or
/// destroyed. Receives the patch id that is going away and an
/// arbitrary opaque token the registrant supplied.
pub type WeakCallback = fn(PatchId, u64);

#[derive(Debug, Clone, Copy)]
pub struct WeakHolder {
    pub callback: Option<WeakCallback>,
    pub token: u64,
}

/// The list of weak holders attached to one patch.
#[derive(Debug, Clone, Default)]
pub struct WeakChain {
    holders: Vec<WeakHolder>,
}

impl WeakChain {
    pub fn retain(&mut self, callback: Option<WeakCallback>, token: u64) {
        self.holders.push(WeakHolder { callback, token });
    }

    /// Release one holder matching `token` (and, if given, `callback`);
    /// optionally invokes its callback as though the target had just
    /// become unreachable. No-op if no holder matches.
    pub fn release(&mut self, token: u64, run_callback: bool, patch: PatchId) {
        if let Some(pos) = self.holders.iter().position(|h| h.token == token) {
            let holder = self.holders.remove(pos);
            if run_callback {
                if let Some(cb) = holder.callback {
                    cb(patch, token);
                }
            }
        }
    }

    /// Fire every remaining holder's callback (used on satisfy/destroy)
    /// and clear the chain.
    pub fn fire_all(&mut self, patch: PatchId) {
        for holder in self.holders.drain(..) {
            if let Some(cb) = holder.callback {
                cb(patch, holder.token);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
