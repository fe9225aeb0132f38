//! fscore: an in-memory patch dependency graph engine for block-based
//! filesystems.
//!
//! A write to a disk block is represented as a [`patch::Patch`]: a
//! small record of what changed and what it must not be written
//! before. Patches form a DAG; the engine ([`engine::PatchGraph`])
//! tracks which patches are ready to hit storage, merges overlapping
//! writes into one patch where it is safe to do so, and keeps enough
//! rollback state around that a crash mid-write can be undone cleanly.
//! The engine never touches storage itself -- that is the job of
//! whatever implements [`device::BlockDevice`].
//!
//! # Example
//!
//! ```
//! use fscore::{Config, PatchGraph, DeviceId};
//!
//! let mut graph = PatchGraph::new(Config::default());
//! graph.register_device(DeviceId(0), 0);
//! let block = graph.insert_block(0, 4096, vec![0u8; 4096]);
//!
//! let patch = graph
//!     .create_byte(block, DeviceId(0), 0, 4, &[1, 2, 3, 4], &[])
//!     .unwrap();
//! assert!(graph.is_ready(patch));
//! graph.satisfy(patch);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block;
pub mod config;
pub mod cycle;
pub mod dep;
pub mod device;
pub mod engine;
pub mod error;
pub mod externafter;
pub mod id;
pub mod level;
pub mod lifecycle;
pub mod merge;
pub mod overlap;
pub mod patch;
pub mod rollback;
pub mod weak;

#[cfg(feature = "global")]
pub mod global;

pub use block::Block;
pub use config::Config;
pub use device::{BlockDevice, Buffer, DeviceId, SyncScope};
pub use engine::PatchGraph;
pub use error::{Code, Error, FsResult};
pub use id::{BlockId, EdgeId, PatchId};
pub use patch::{Patch, PatchFlags, PatchKind};
pub use weak::WeakCallback;
