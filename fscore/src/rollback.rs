//! Apply and rollback of a single patch's bytes (reference spec §4.5,
//! `patch_apply`/`patch_rollback`).
//!
//! BYTE and BIT patches are applied in place, swapping the block's live
//! bytes against the patch's rollback buffer (or XOR-toggling, for
//! BIT). `Config::swap_fullblock_data` additionally lets a full-block
//! BYTE patch swap its rollback buffer with the block's backing
//! `Vec<u8>` outright instead of copying, avoiding a memcpy for the
//! common "overwrite the whole block" case.

use crate::block::Block;
use crate::config::Config;
use crate::error::{Error, FsResult};
use crate::patch::{Patch, PatchFlags, PatchKind};

fn byte_sum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32).rotate_left(1))
}

/// Swap a BYTE patch's rollback buffer against the live bytes
/// `[offset, offset+length)` of `block`. When the patch covers the
/// whole block and full-block swapping is enabled, swaps the owning
/// `Vec`s outright instead of copying byte by byte.
fn swap_byte(block: &mut Block, offset: u16, length: u16, rollback: &mut Option<alloc::vec::Vec<u8>>, config: &Config) {
    let buf = rollback.as_mut().expect("caller checked for NRB");
    if config.swap_fullblock_data && offset == 0 && length as u32 == block.length {
        core::mem::swap(&mut block.data, buf);
        return;
    }
    let start = offset as usize;
    let end = start + length as usize;
    block.data[start..end].swap_with_slice(buf);
}

/// Move `patch` from its rolled-back state to applied: BYTE/BIT write
/// their content into `block`, EMPTY is a no-op. Errors if the patch
/// is not currently rolled back.
pub fn apply(patch: &mut Patch, block: &mut Block, config: &Config) -> FsResult<()> {
    if !patch.is_rolled_back() {
        return Err(Error::invalid("patch is not rolled back"));
    }
    match &mut patch.kind {
        PatchKind::Bit { word_offset, xor, .. } => {
            let start = *word_offset as usize;
            let mut word = u32::from_le_bytes(block.data[start..start + 4].try_into().unwrap());
            word ^= *xor;
            block.data[start..start + 4].copy_from_slice(&word.to_le_bytes());
        }
        PatchKind::Byte { offset, length, rollback, old_sum, new_sum } => {
            if rollback.is_none() {
                return Err(Error::invalid("cannot apply an NRB patch"));
            }
            if config.account {
                if let Some(expected) = *new_sum {
                    if byte_sum(rollback.as_ref().unwrap()) != expected {
                        log::warn!("byte patch corrupted before apply");
                    }
                }
            }
            swap_byte(block, *offset, *length, rollback, config);
            if config.account {
                *old_sum = Some(byte_sum(rollback.as_ref().unwrap()));
            }
        }
        PatchKind::Empty => {}
    }
    patch.flags.remove(PatchFlags::ROLLBACK);
    Ok(())
}

/// Move `patch` from applied to rolled back: the inverse of
/// [`apply`]. Errors if the patch is already rolled back.
pub fn rollback(patch: &mut Patch, block: &mut Block, config: &Config) -> FsResult<()> {
    if patch.is_rolled_back() {
        return Err(Error::invalid("patch is already rolled back"));
    }
    match &mut patch.kind {
        PatchKind::Bit { word_offset, xor, .. } => {
            let start = *word_offset as usize;
            let mut word = u32::from_le_bytes(block.data[start..start + 4].try_into().unwrap());
            word ^= *xor;
            block.data[start..start + 4].copy_from_slice(&word.to_le_bytes());
        }
        PatchKind::Byte { offset, length, rollback: rb, old_sum, new_sum } => {
            if rb.is_none() {
                return Err(Error::invalid("cannot roll back an NRB patch"));
            }
            if config.account {
                if let Some(expected) = *old_sum {
                    if byte_sum(rb.as_ref().unwrap()) != expected {
                        log::warn!("byte patch corrupted before rollback");
                    }
                }
            }
            swap_byte(block, *offset, *length, rb, config);
            if config.account {
                *new_sum = Some(byte_sum(rb.as_ref().unwrap()));
            }
        }
        PatchKind::Empty => {}
    }
    patch.flags.insert(PatchFlags::ROLLBACK);
    Ok(())
}
