// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlation id allocation for one control channel.
//!
//! Ids are issued from `1..=i32::MAX` (the server stores `sn` as a signed
//! 32-bit integer) and wrap back to `1`. Zero and negative values are never
//! issued. A wrapped id that collides with a still-pending request is
//! rejected by the pending table, not here.

use crate::protocol::CorrelationId;
use std::sync::atomic::{AtomicU32, Ordering};

const FIRST_ID: u32 = 1;
const LAST_ID: u32 = i32::MAX as u32;

/// Lock-free, strictly increasing (modulo wrap) id source.
#[derive(Debug)]
pub struct SequenceAllocator {
    last: AtomicU32,
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Allocator whose next id is `last + 1` (wrapping).
    pub fn starting_after(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last.min(LAST_ID)),
        }
    }

    /// Allocate the next id. Concurrent callers never observe the same value
    /// until `i32::MAX` further ids have been issued.
    pub fn next(&self) -> CorrelationId {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(Self::successor(last))
            })
            .unwrap_or_else(|current| current);
        CorrelationId::new(i64::from(Self::successor(previous)))
    }

    fn successor(last: u32) -> u32 {
        if last >= LAST_ID {
            FIRST_ID
        } else {
            last + 1
        }
    }
}
