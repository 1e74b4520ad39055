use serde::Serialize;

use crate::sha::{self, Midstate};

pub const PREHASH_LEN: usize = 64;

/// Global work size of one kernel dispatch. Lane `i` of a batch is
/// `x + X * (y + Y * z)`, so `x` varies fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkDims { pub x: usize, pub y: usize, pub z: usize }

impl WorkDims {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    pub fn checked_batch_size(&self) -> Option<u32> {
        self.x
            .checked_mul(self.y)
            .and_then(|xy| xy.checked_mul(self.z))
            .and_then(|n| u32::try_from(n).ok())
    }

    pub fn batch_size(&self) -> u32 {
        self.checked_batch_size().unwrap_or(u32::MAX)
    }

    pub fn as_array(&self) -> [usize; 3] {
        [self.x, self.y, self.z]
    }

    /// Clamp each dimension to the device limit. Returns the clamped
    /// dimensions and the indices that had to be reduced.
    pub fn clamp_to(&self, max: [usize; 3]) -> (WorkDims, Vec<usize>) {
        let mut dims = self.as_array();
        let mut clamped = Vec::new();
        for i in 0..3 {
            if dims[i] > max[i] {
                dims[i] = max[i];
                clamped.push(i);
            }
        }
        (WorkDims::new(dims[0], dims[1], dims[2]), clamped)
    }
}

/// One unit of search work as received from the client. Replaced wholesale,
/// never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub difficulty_mask: u32,
    pub start_nonce: u64,
    pub prehash: [u8; PREHASH_LEN],
    /// SHA-256 state after compressing `prehash`; what the kernel resumes from.
    pub midstate: Midstate,
}

impl Job {
    pub fn new(difficulty_mask: u32, start_nonce: u64, prehash: [u8; PREHASH_LEN]) -> Self {
        let midstate = sha::midstate(&prehash);
        Self { difficulty_mask, start_nonce, prehash, midstate }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Share {
    pub prehash: [u8; PREHASH_LEN],
    pub nonce: u64,
}
