//! Patch creation, dependency management, and destruction/reclamation
//! (reference spec §4.1, §4.2, §4.7, §4.8). All of `PatchGraph`'s
//! mutating API lives here; [`crate::engine`] only owns the storage.

use alloc::vec::Vec;

use crate::cycle;
use crate::dep::Edge;
use crate::device::DeviceId;
use crate::engine::PatchGraph;
use crate::error::{Error, FsResult};
use crate::externafter;
use crate::id::{BlockId, PatchId};
use crate::level;
use crate::merge;
use crate::overlap::{self, ByteOverlap};
use crate::patch::{Patch, PatchFlags, PatchKind};
use crate::rollback;
use crate::weak::WeakCallback;

impl PatchGraph {
    /// Link `patch` into its block's bookkeeping lists (reference
    /// `patch_link_all_patches`/`patch_link_index_patches`/
    /// `patch_link_ready_patches`), called once right after insertion.
    fn link_new_patch(&mut self, patch: PatchId, block_id: Option<BlockId>) {
        if let Some(block_id) = block_id {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.link_all(patch);
            }
            if let Some(own_level) = self.level(patch) {
                if let Some(block) = self.blocks.get_mut(block_id) {
                    block.link_index(own_level, patch);
                }
            }
            level::update_ready_patches(&self.patches, &mut self.blocks, &self.device_levels, patch);
        }
    }

    fn unlink_dead_patch(&mut self, patch: PatchId, block_id: Option<BlockId>, own_level: Option<u16>) {
        if let Some(block_id) = block_id {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.unlink_all(patch);
                if let Some(level) = own_level {
                    block.unlink_index(level, patch);
                    block.unlink_ready(level, patch);
                }
            }
        }
    }

    /// Add a dependency `after` -> `before` ("after cannot be written
    /// until before is"), refusing if doing so would create a cycle
    /// (reference spec §4.2, §4.4).
    pub fn add_depend(&mut self, after: PatchId, before: PatchId) -> FsResult<()> {
        if after == before {
            return Err(Error::invalid("a patch cannot depend on itself"));
        }
        let Some(after_p) = self.patches.get(after) else { return Err(Error::invalid("unknown patch id")) };
        if !self.patches.contains(before) {
            return Err(Error::invalid("unknown patch id"));
        }
        let after_safe = after_p.flags.contains(PatchFlags::SAFE_AFTER)
            || (after_p.kind.is_empty_kind() && after_p.after_edges.is_empty());
        let after_inflight = after_p.is_inflight();
        let after_written = after_p.is_written();
        let after_block = after_p.block;

        if !after_safe {
            return Err(Error::invalid("after must be a bare EMPTY with no afters, or carry SAFE_AFTER"));
        }
        if after_inflight {
            return Err(Error::invalid("cannot add a before to an inflight patch"));
        }

        let before_written = self.patches.get(before).map(|p| p.is_written()).unwrap_or(false);
        if after_written {
            return if before_written {
                Ok(())
            } else {
                Err(Error::invalid("cannot add a before to an already written patch"))
            };
        }
        if before_written {
            return Ok(());
        }

        let before_block = self.patches.get(before).and_then(|p| p.block);
        let before_inflight = self.patches.get(before).map(|p| p.is_inflight()).unwrap_or(false);
        if after_block.is_some() && after_block == before_block && before_inflight {
            return Ok(());
        }

        if cycle::quick_depends_on(&self.patches, &self.edges, after, before) && !self.config.allow_multigraph {
            return Ok(());
        }

        if self.patches.get(before).map(|p| p.flags.contains(PatchFlags::SET_EMPTY)).unwrap_or(false) {
            let set_befores: Vec<PatchId> = self
                .patches
                .get(before)
                .map(|p| p.before_edges.iter().filter_map(|&e| self.edges.get(e)).map(|e| e.before).collect())
                .unwrap_or_default();
            for b in set_befores {
                self.add_depend(after, b)?;
            }
            return Ok(());
        }

        let would_cycle = if self.config.cycle_check {
            cycle::debug_find_cycle(&self.patches, &self.edges, after, before).is_some()
        } else {
            cycle::would_cycle(&self.patches, &self.edges, after, before)
        };
        if would_cycle {
            return Err(Error::busy("adding this dependency would create a cycle"));
        }

        let edge_id = self.edges.insert(Edge { after, before });
        if let Some(p) = self.patches.get_mut(after) {
            p.before_edges.push(edge_id);
        }
        if let Some(p) = self.patches.get_mut(before) {
            p.after_edges.push(edge_id);
        }

        level::on_depend_added(&mut self.patches, &self.edges, &mut self.blocks, &self.device_levels, after, before);

        if !before_inflight {
            externafter::propagate_extern_after_change(&self.patches, &self.edges, &mut self.blocks, after, before, true);
        }
        Ok(())
    }

    /// Remove the (first) dependency edge `after` -> `before`, if any.
    pub fn remove_depend(&mut self, after: PatchId, before: PatchId) {
        let edge_id = match self.patches.get(after) {
            Some(p) => p.before_edges.iter().copied().find(|&e| {
                self.edges.get(e).map(|edge| edge.before == before).unwrap_or(false)
            }),
            None => None,
        };
        let Some(edge_id) = edge_id else { return };

        if let Some(p) = self.patches.get_mut(after) {
            p.before_edges.retain(|&e| e != edge_id);
        }
        if let Some(p) = self.patches.get_mut(before) {
            p.after_edges.retain(|&e| e != edge_id);
        }
        self.edges.remove(edge_id);

        level::on_depend_removed(&mut self.patches, &self.edges, &mut self.blocks, &self.device_levels, after, before);

        let before_inflight = self.patches.get(before).map(|p| p.is_inflight()).unwrap_or(false);
        if !before_inflight {
            externafter::propagate_extern_after_change(&self.patches, &self.edges, &mut self.blocks, after, before, false);
        }
    }

    fn wire_befores(&mut self, patch: PatchId, befores: &[PatchId]) -> FsResult<()> {
        for &before in befores {
            let already_written = self.patches.get(before).map(|p| p.is_written()).unwrap_or(true);
            if !already_written {
                self.add_depend(patch, before)?;
            }
        }
        Ok(())
    }

    /// Wire `new_patch -> old` for every live, unmerged BYTE patch on
    /// `block_id` that overlaps `[offset, offset+length)` (reference
    /// spec §4.1 step 2/5, invariant 6: overlapping same-block patches
    /// are connected unless the new one subsumes the old). A candidate
    /// the new patch fully covers is dropped from the byte index
    /// instead of depended on, since its range no longer needs a
    /// separate lookup entry. Assumes the caller already marked `new_patch`
    /// `SAFE_AFTER` for the duration of this call.
    fn wire_byte_overlaps(&mut self, new_patch: PatchId, block_id: BlockId, offset: u16, length: u16) -> FsResult<()> {
        let candidates = self.blocks.get(block_id).map(|b| b.byte_index.candidates(offset, length)).unwrap_or_default();
        let mut full_overlap = false;
        for candidate in candidates {
            if candidate == new_patch {
                continue;
            }
            let Some((old_offset, old_length)) = self.patches.get(candidate).and_then(|p| p.byte_range()) else { continue };
            let ov = overlap::byte_overlap(offset, length, old_offset, old_length);
            if ov == ByteOverlap::Disjoint {
                continue;
            }
            let old_done = self.patches.get(candidate).map(|p| p.is_written() || p.is_freeing()).unwrap_or(true);
            if old_done {
                continue;
            }
            if ov == ByteOverlap::NewCoversOld {
                full_overlap = true;
                if let Some(p) = self.patches.get_mut(candidate) {
                    p.flags.remove(PatchFlags::OVERLAP);
                }
                if let Some(block) = self.blocks.get_mut(block_id) {
                    block.byte_index.remove(candidate, old_offset, old_length);
                }
                continue;
            }
            if let Some(p) = self.patches.get_mut(candidate) {
                p.flags.insert(PatchFlags::OVERLAP);
            }
            self.add_depend(new_patch, candidate)?;
        }
        if full_overlap {
            if let Some(p) = self.patches.get_mut(new_patch) {
                p.flags.insert(PatchFlags::FULLOVERLAP);
            }
        }
        Ok(())
    }

    /// Wire `byte_patch -> bit_patch` for every live BIT patch on
    /// `block_id` whose word lies inside `[offset, offset+length)`
    /// (reference spec §4.3: "the engine also iterates BIT-overlap
    /// lists and installs new→old edges wherever the BIT's word lies
    /// inside the BYTE range"). Assumes the caller already marked
    /// `byte_patch` `SAFE_AFTER` for the duration of this call.
    fn wire_covering_bits_for_byte(&mut self, byte_patch: PatchId, block_id: BlockId, offset: u16, length: u16) -> FsResult<()> {
        let words = self.blocks.get(block_id).map(|b| b.bit_index.words_covered_by(offset, length)).unwrap_or_default();
        for (_, bit_patch) in words {
            if bit_patch == byte_patch {
                continue;
            }
            let live = self.patches.get(bit_patch).map(|p| !p.is_written() && !p.is_freeing()).unwrap_or(false);
            if live {
                self.add_depend(byte_patch, bit_patch)?;
            }
        }
        Ok(())
    }

    /// Wire `bit_patch -> byte_patch` when a live BYTE patch on
    /// `block_id` already covers `word_offset` (reference spec §4.3:
    /// "a BIT patch being inserted when a BYTE patch covers its word
    /// must depend on the covering BYTE patch"). Assumes the caller
    /// already marked `bit_patch` `SAFE_AFTER` for the duration of this
    /// call.
    fn wire_covering_byte_for_bit(&mut self, bit_patch: PatchId, block_id: BlockId, word_offset: u16) -> FsResult<()> {
        let candidates = self.blocks.get(block_id).map(|b| b.byte_index.candidates(word_offset, 4)).unwrap_or_default();
        for candidate in candidates {
            if candidate == bit_patch {
                continue;
            }
            let Some((old_offset, old_length)) = self.patches.get(candidate).and_then(|p| p.byte_range()) else { continue };
            if !overlap::byte_covers_word(old_offset, old_length, word_offset) {
                continue;
            }
            let live = self.patches.get(candidate).map(|p| !p.is_written() && !p.is_freeing()).unwrap_or(false);
            if live {
                self.add_depend(bit_patch, candidate)?;
            }
        }
        Ok(())
    }

    /// Create a free-floating or owned join/fork/collector node
    /// (reference `create_empty_{set,array,list}`).
    pub fn create_empty(&mut self, owner: Option<DeviceId>, befores: &[PatchId]) -> FsResult<PatchId> {
        let id = self.patches.insert(Patch::new(PatchKind::Empty, owner, None));
        self.wire_befores(id, befores)?;
        Ok(id)
    }

    /// Create (or fold into an existing patch) a contiguous byte-range
    /// write (reference `patch_create_byte`/`patch_create_byte_basic`).
    pub fn create_byte(
        &mut self,
        block_id: BlockId,
        owner: DeviceId,
        offset: u16,
        length: u16,
        data: &[u8],
        befores: &[PatchId],
    ) -> FsResult<PatchId> {
        let block_len = self.blocks.get(block_id).map(|b| b.length).ok_or_else(|| Error::invalid("unknown block"))?;
        if length == 0 {
            return Err(Error::invalid("byte patch length must be nonzero"));
        }
        if data.len() != length as usize || offset as u32 + length as u32 > block_len {
            return Err(Error::invalid("byte patch range out of bounds"));
        }

        let extern_afters = self.blocks.get(block_id).map(|b| b.extern_after_count).unwrap_or(0);
        if self.config.nrb && extern_afters == 0 {
            return self.create_byte_nrb(block_id, owner, offset, length, data, befores);
        }

        if let Some(plan) =
            merge::find_byte_merge(&self.patches, &self.edges, &self.blocks, &self.config, block_id, offset, length, befores)
        {
            let (old_offset, old_length) = self
                .patches
                .get(plan.into)
                .and_then(|p| p.byte_range())
                .ok_or_else(|| Error::invalid("merge target vanished"))?;

            if let Some(block) = self.blocks.get_mut(block_id) {
                block.data[offset as usize..offset as usize + length as usize].copy_from_slice(data);
                block.byte_index.remove(plan.into, old_offset, old_length);
                block.byte_index.insert(plan.into, plan.offset, plan.length);
            }
            if let Some(p) = self.patches.get_mut(plan.into) {
                p.kind = PatchKind::Byte { offset: plan.offset, length: plan.length, rollback: Some(plan.rollback), old_sum: None, new_sum: None };
                p.flags.insert(PatchFlags::SAFE_AFTER);
            }
            let mut wired = self.wire_covering_bits_for_byte(plan.into, block_id, plan.offset, plan.length);
            if wired.is_ok() {
                wired = self.wire_befores(plan.into, befores);
            }
            if let Some(p) = self.patches.get_mut(plan.into) {
                p.flags.remove(PatchFlags::SAFE_AFTER);
            }
            wired?;
            if self.config.account {
                self.stats.byte_patches_merged += 1;
            }
            return Ok(plan.into);
        }

        let rollback_buf = self
            .blocks
            .get(block_id)
            .map(|b| b.data[offset as usize..offset as usize + length as usize].to_vec())
            .ok_or_else(|| Error::invalid("unknown block"))?;

        let id = self.patches.insert(Patch::new(
            PatchKind::Byte { offset, length, rollback: Some(rollback_buf), old_sum: None, new_sum: None },
            Some(owner),
            Some(block_id),
        ));
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.insert(PatchFlags::SAFE_AFTER);
        }
        if let Some(block) = self.blocks.get_mut(block_id) {
            block.data[offset as usize..offset as usize + length as usize].copy_from_slice(data);
            block.byte_index.insert(id, offset, length);
        }
        self.link_new_patch(id, Some(block_id));
        if let Err(e) = self.wire_byte_overlaps(id, block_id, offset, length) {
            self.destroy(id);
            return Err(e);
        }
        if let Err(e) = self.wire_covering_bits_for_byte(id, block_id, offset, length) {
            self.destroy(id);
            return Err(e);
        }
        if let Err(e) = self.wire_befores(id, befores) {
            self.destroy(id);
            return Err(e);
        }
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.remove(PatchFlags::SAFE_AFTER);
        }
        if self.config.account {
            self.stats.byte_patches_created += 1;
        }
        Ok(id)
    }

    /// Allocate (or extend) the block's single non-rollbackable patch
    /// (reference §9 / `select_patch_merger`, taken when the block has
    /// no external afters: nothing outside it needs the old content).
    fn create_byte_nrb(
        &mut self,
        block_id: BlockId,
        owner: DeviceId,
        offset: u16,
        length: u16,
        data: &[u8],
        befores: &[PatchId],
    ) -> FsResult<PatchId> {
        if let Some(nrb_id) = self.blocks.get(block_id).and_then(|b| b.nrb) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.data[offset as usize..offset as usize + length as usize].copy_from_slice(data);
            }
            self.wire_befores(nrb_id, befores)?;
            return Ok(nrb_id);
        }

        let block_len = self.blocks.get(block_id).map(|b| b.length).ok_or_else(|| Error::invalid("unknown block"))?;
        let id = self.patches.insert(Patch::new(
            PatchKind::Byte { offset: 0, length: block_len as u16, rollback: None, old_sum: None, new_sum: None },
            Some(owner),
            Some(block_id),
        ));
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.insert(PatchFlags::SAFE_AFTER);
        }
        if let Some(block) = self.blocks.get_mut(block_id) {
            block.data[offset as usize..offset as usize + length as usize].copy_from_slice(data);
            block.nrb = Some(id);
        }
        self.link_new_patch(id, Some(block_id));
        // A fresh NRB spans the whole block, so every other live BYTE
        // patch on it is by definition fully covered (invariant 6).
        if let Err(e) = self.wire_byte_overlaps(id, block_id, 0, block_len as u16) {
            self.destroy(id);
            return Err(e);
        }
        if let Err(e) = self.wire_befores(id, befores) {
            self.destroy(id);
            return Err(e);
        }
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.remove(PatchFlags::SAFE_AFTER);
        }
        if self.config.account {
            self.stats.nrb_patches_created += 1;
        }
        Ok(id)
    }

    /// Split `data` into `atomic_size`-aligned chunks, each written as
    /// its own BYTE patch chained after the previous chunk's tail, so
    /// the device can guarantee at most one chunk is torn by a crash
    /// (reference `patch_create_byte_atomic`).
    pub fn create_byte_atomic(
        &mut self,
        block_id: BlockId,
        owner: DeviceId,
        offset: u16,
        length: u16,
        data: &[u8],
        befores: &[PatchId],
        atomic_size: u16,
    ) -> FsResult<PatchId> {
        if atomic_size == 0 {
            return self.create_byte(block_id, owner, offset, length, data, befores);
        }
        let mut tail: Option<PatchId> = None;
        let mut pos = 0u16;
        while pos < length {
            let chunk_len = atomic_size.min(length - pos);
            let chunk_befores: Vec<PatchId> = match tail {
                Some(prev) => alloc::vec![prev],
                None => befores.to_vec(),
            };
            let chunk = self.create_byte(
                block_id,
                owner,
                offset + pos,
                chunk_len,
                &data[pos as usize..pos as usize + chunk_len as usize],
                &chunk_befores,
            )?;
            tail = Some(chunk);
            pos += chunk_len;
        }
        tail.ok_or_else(|| Error::invalid("zero-length atomic write"))
    }

    /// Create (or fold into an existing patch) a 32-bit-word XOR toggle
    /// (reference `patch_create_bit`).
    pub fn create_bit(&mut self, block_id: BlockId, owner: DeviceId, word_offset: u16, xor: u32, head: Option<PatchId>) -> FsResult<PatchId> {
        // NRB downgrade (reference spec §4.1 "Create BIT"): a block
        // that already has a non-rollbackable patch absorbs the bit
        // toggle directly instead of allocating a distinct BIT patch,
        // as long as doing so stays dependency-safe.
        if let Some(nrb_id) = self.blocks.get(block_id).and_then(|b| b.nrb) {
            let safe = match head {
                Some(h) => merge::merge_is_cycle_safe(&self.patches, &self.edges, nrb_id, &[h]),
                None => true,
            };
            if safe {
                self.apply_bit_word(block_id, word_offset, xor);
                if let Some(h) = head {
                    if let Some(p) = self.patches.get_mut(nrb_id) {
                        p.flags.insert(PatchFlags::SAFE_AFTER);
                    }
                    let r = self.add_depend(nrb_id, h);
                    if let Some(p) = self.patches.get_mut(nrb_id) {
                        p.flags.remove(PatchFlags::SAFE_AFTER);
                    }
                    r?;
                }
                return Ok(nrb_id);
            }
        }

        if let Some(existing) = merge::find_bit_merge(&self.patches, &self.blocks, &self.config, block_id, word_offset, xor, xor) {
            if let PatchKind::Bit { xor: existing_xor, or, .. } =
                &mut self.patches.get_mut(existing).ok_or_else(|| Error::invalid("merge target vanished"))?.kind
            {
                *existing_xor ^= xor;
                *or |= xor;
            }
            if let Some(p) = self.patches.get_mut(existing) {
                p.flags.insert(PatchFlags::SAFE_AFTER);
            }
            let mut wired = self.wire_covering_byte_for_bit(existing, block_id, word_offset);
            if wired.is_ok() {
                if let Some(head) = head {
                    wired = self.add_depend(existing, head);
                }
            }
            if let Some(p) = self.patches.get_mut(existing) {
                p.flags.remove(PatchFlags::SAFE_AFTER);
            }
            wired?;
            self.apply_bit_word(block_id, word_offset, xor);
            return Ok(existing);
        }

        let id = self.patches.insert(Patch::new(PatchKind::Bit { word_offset, xor, or: xor }, Some(owner), Some(block_id)));
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.insert(PatchFlags::SAFE_AFTER);
        }
        if let Some(block) = self.blocks.get_mut(block_id) {
            block.bit_index.set_group(word_offset, id);
        }
        self.apply_bit_word(block_id, word_offset, xor);
        self.link_new_patch(id, Some(block_id));
        let mut wired = self.wire_covering_byte_for_bit(id, block_id, word_offset);
        if wired.is_ok() {
            if let Some(head) = head {
                wired = self.add_depend(id, head);
            }
        }
        if let Some(p) = self.patches.get_mut(id) {
            p.flags.remove(PatchFlags::SAFE_AFTER);
        }
        if let Err(e) = wired {
            self.destroy(id);
            return Err(e);
        }
        Ok(id)
    }

    fn apply_bit_word(&mut self, block_id: BlockId, word_offset: u16, xor: u32) {
        if let Some(block) = self.blocks.get_mut(block_id) {
            let start = word_offset as usize;
            let mut word = u32::from_le_bytes(block.data[start..start + 4].try_into().unwrap());
            word ^= xor;
            block.data[start..start + 4].copy_from_slice(&word.to_le_bytes());
        }
    }

    /// Move `patch` from its owning device `from` to `to`, updating its
    /// index membership and cascading any resulting level change
    /// (reference: the owner reassignment step of `patch_create_byte_merge_overlap2`).
    pub fn push_down(&mut self, patch: PatchId, from: DeviceId, to: DeviceId) {
        let Some(owner) = self.patches.get(patch).and_then(|p| p.owner) else { return };
        if owner != from {
            return;
        }
        let block_id = self.patches.get(patch).and_then(|p| p.block);
        let old_level = self.level(patch);
        if let (Some(block_id), Some(old_level)) = (block_id, old_level) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.unlink_index(old_level, patch);
            }
        }
        if let Some(p) = self.patches.get_mut(patch) {
            p.owner = Some(to);
        }
        let new_level = self.level(patch);
        if let (Some(block_id), Some(new_level)) = (block_id, new_level) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.link_index(new_level, patch);
            }
        }
        level::update_ready_patches(&self.patches, &mut self.blocks, &self.device_levels, patch);
        if old_level != new_level {
            level::propagate_level_change(&mut self.patches, &self.edges, &mut self.blocks, &self.device_levels, patch, old_level, new_level);
        }
    }

    /// Mark a write issued but not yet acknowledged: bumps the
    /// patch's effective level by one (so nothing new follows it until
    /// the write lands) and pre-decrements its block's external-after
    /// count (reference `patch_set_inflight`).
    pub fn set_inflight(&mut self, patch: PatchId) {
        let Some(p) = self.patches.get(patch) else { return };
        if p.is_inflight() {
            return;
        }
        let owner_level = self.level(patch);

        externafter::predecrement_for_inflight(&self.patches, &self.edges, &mut self.blocks, patch);

        if let Some(block_id) = p.block {
            let was_nrb = self.blocks.get(block_id).map(|b| b.nrb == Some(patch)).unwrap_or(false);
            if was_nrb {
                if let Some(block) = self.blocks.get_mut(block_id) {
                    block.nrb = None;
                }
            }
        }

        let block_id = self.patches.get(patch).and_then(|p| p.block);
        if let (Some(block_id), Some(owner_level)) = (block_id, owner_level) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.unlink_index(owner_level, patch);
                block.unlink_ready(owner_level, patch);
            }
        }

        if let Some(p) = self.patches.get_mut(patch) {
            p.flags.insert(PatchFlags::INFLIGHT);
        }
        let new_level = self.level(patch);
        if let (Some(block_id), Some(new_level)) = (block_id, new_level) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                block.link_index(new_level, patch);
            }
        }
        level::update_ready_patches(&self.patches, &mut self.blocks, &self.device_levels, patch);
        level::propagate_level_change(&mut self.patches, &self.edges, &mut self.blocks, &self.device_levels, patch, owner_level, new_level);
    }

    /// Apply or roll back `patch`'s bytes against its block.
    pub fn apply(&mut self, patch: PatchId) -> FsResult<()> {
        let block_id = self.patches.get(patch).and_then(|p| p.block).ok_or_else(|| Error::invalid("unknown patch"))?;
        let p = self.patches.get_mut(patch).ok_or_else(|| Error::invalid("unknown patch"))?;
        let block = self.blocks.get_mut(block_id).ok_or_else(|| Error::invalid("unknown block"))?;
        rollback::apply(p, block, &self.config)
    }

    pub fn rollback(&mut self, patch: PatchId) -> FsResult<()> {
        let block_id = self.patches.get(patch).and_then(|p| p.block).ok_or_else(|| Error::invalid("unknown patch"))?;
        let p = self.patches.get_mut(patch).ok_or_else(|| Error::invalid("unknown patch"))?;
        let block = self.blocks.get_mut(block_id).ok_or_else(|| Error::invalid("unknown block"))?;
        rollback::rollback(p, block, &self.config)
    }

    /// Mark a ready patch WRITTEN: detach it from every patch that
    /// depended on it and notify any weak holders (reference
    /// `patch_satisfy`).
    pub fn satisfy(&mut self, patch: PatchId) {
        let Some(p) = self.patches.get(patch) else { return };
        if p.is_written() {
            log::warn!("satisfaction of an already satisfied patch");
            return;
        }
        if !p.before_edges.is_empty() && !matches!(p.kind, PatchKind::Empty) {
            log::warn!("satisfying a non-empty patch with outstanding befores");
            return;
        }

        let afters: Vec<PatchId> = p
            .after_edges
            .iter()
            .filter_map(|&e| self.edges.get(e))
            .map(|e| e.after)
            .collect();
        for after in afters {
            self.remove_depend(after, patch);
        }

        let block_id = self.patches.get(patch).and_then(|p| p.block);
        let own_level = self.level(patch);

        if let Some(p) = self.patches.get_mut(patch) {
            p.flags.insert(PatchFlags::WRITTEN);
            if let PatchKind::Byte { rollback, .. } = &mut p.kind {
                *rollback = None;
            }
        }

        self.unlink_dead_patch(patch, block_id, own_level);
        if let Some(p) = self.patches.get_mut(patch) {
            p.weak.fire_all(patch);
        }

        if !self.patches.get(patch).map(|p| p.is_freeing()).unwrap_or(false) {
            self.free_empties.push(patch);
        }
    }

    /// Remove every remaining dependency of `patch` and discard it
    /// from the graph (reference `patch_destroy`): satisfies it first
    /// if anything still depends on it, since a written patch carries
    /// no edges (invariant 8).
    pub fn destroy(&mut self, patch: PatchId) {
        let Some(p) = self.patches.get(patch) else { return };
        if p.is_freeing() {
            return;
        }
        if let Some(p) = self.patches.get_mut(patch) {
            p.flags.insert(PatchFlags::FREEING);
        }

        let befores: Vec<PatchId> = self
            .patches
            .get(patch)
            .map(|p| p.before_edges.iter().filter_map(|&e| self.edges.get(e)).map(|e| e.before).collect())
            .unwrap_or_default();
        for before in befores {
            self.remove_depend(patch, before);
        }

        let has_afters = self.patches.get(patch).map(|p| !p.after_edges.is_empty()).unwrap_or(false);
        if has_afters {
            self.satisfy(patch);
        } else {
            let block_id = self.patches.get(patch).and_then(|p| p.block);
            let own_level = self.level(patch);
            self.unlink_dead_patch(patch, block_id, own_level);
            if let Some(p) = self.patches.get_mut(patch) {
                p.weak.fire_all(patch);
            }
        }

        if let Some(block_id) = self.patches.get(patch).and_then(|p| p.block) {
            if let Some(block) = self.blocks.get_mut(block_id) {
                if block.nrb == Some(patch) {
                    block.nrb = None;
                }
                if let Some(PatchKind::Byte { offset, length, .. }) = self.patches.get(patch).map(|p| p.kind.clone()) {
                    block.byte_index.remove(patch, offset, length);
                }
                if let Some(PatchKind::Bit { word_offset, .. }) = self.patches.get(patch).map(|p| p.kind.clone()) {
                    if block.bit_index.group_for(word_offset) == Some(patch) {
                        block.bit_index.remove_group(word_offset);
                    }
                }
            }
        }

        self.free_empties.retain(|&id| id != patch);
        self.patches.remove(patch);
    }

    /// Drain the process-wide free list of satisfied EMPTYs, unwinding
    /// any `SET_EMPTY` collectors' remaining befores first (reference
    /// `patch_reclaim_written`).
    pub fn reclaim_written(&mut self) {
        let pending = core::mem::take(&mut self.free_empties);
        for patch in pending {
            if !self.patches.contains(patch) {
                continue;
            }
            let is_set_empty = self.patches.get(patch).map(|p| p.flags.contains(PatchFlags::SET_EMPTY)).unwrap_or(false);
            if is_set_empty {
                let befores: Vec<PatchId> = self
                    .patches
                    .get(patch)
                    .map(|p| p.before_edges.iter().filter_map(|&e| self.edges.get(e)).map(|e| e.before).collect())
                    .unwrap_or_default();
                for before in befores {
                    self.remove_depend(patch, before);
                }
            }
            self.destroy(patch);
        }
    }

    /// Take `patch` off the free list so the caller can keep building
    /// on it as a fresh EMPTY (reference `patch_claim_empty`).
    pub fn claim_empty(&mut self, patch: PatchId) {
        self.free_empties.retain(|&id| id != patch);
    }

    /// Detach every after of a not-yet-written EMPTY and push it onto
    /// the free list for later reclamation (reference
    /// `patch_autorelease_empty`).
    pub fn autorelease_empty(&mut self, patch: PatchId) {
        let afters: Vec<PatchId> = self
            .patches
            .get(patch)
            .map(|p| p.after_edges.iter().filter_map(|&e| self.edges.get(e)).map(|e| e.after).collect())
            .unwrap_or_default();
        for after in afters {
            self.remove_depend(after, patch);
        }
        if !self.free_empties.contains(&patch) {
            self.free_empties.push(patch);
        }
    }

    /// Mark an EMPTY as a transient befores-set container: `add_depend`
    /// targeting it should be understood to recurse into its own
    /// befores rather than depend on it directly (reference
    /// `patch_set_empty_declare`).
    pub fn declare_set_empty(&mut self, patch: PatchId) {
        if let Some(p) = self.patches.get_mut(patch) {
            p.flags.insert(PatchFlags::SET_EMPTY);
        }
        if !self.free_empties.contains(&patch) {
            self.free_empties.push(patch);
        }
    }

    /// Register a weak holder on `patch`; `callback` (if any) fires
    /// with `token` when `patch` is satisfied or destroyed.
    pub fn weak_retain(&mut self, patch: PatchId, callback: Option<WeakCallback>, token: u64) {
        if let Some(p) = self.patches.get_mut(patch) {
            p.weak.retain(callback, token);
        }
    }

    /// Release a previously retained weak holder, optionally firing
    /// its callback as though `patch` had just become unreachable.
    pub fn weak_release(&mut self, patch: PatchId, token: u64, run_callback: bool) {
        if let Some(p) = self.patches.get_mut(patch) {
            p.weak.release(token, run_callback, patch);
        }
    }
}
