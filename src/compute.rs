use thiserror::Error;

use crate::sha::Midstate;

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("OpenCL call failed: {0}")]
    OpenCl(String),
    #[error("program build failed: {0}")]
    Build(String),
    #[error("no OpenCL platforms available")]
    NoPlatform,
    #[error("invalid platform ID {index} ({count} available)")]
    InvalidPlatform { index: usize, count: usize },
    #[error("no OpenCL devices available on this platform")]
    NoDevice,
    #[error("invalid device ID {index} ({count} available)")]
    InvalidDevice { index: usize, count: usize },
    #[error("batch submitted before a midstate was installed")]
    NoMidstate,
    #[error("batch returned {got} results, expected {expected}")]
    ResultLength { expected: usize, got: usize },
}

impl From<ocl::Error> for ComputeError {
    fn from(err: ocl::Error) -> Self {
        ComputeError::OpenCl(err.to_string())
    }
}

/// Accelerator handle driven by the orchestrator. Every error is fatal for
/// the process; implementations do not retry.
pub trait ComputeContext {
    fn batch_size(&self) -> u32;

    /// Replace the read-only midstate input. The previous buffer, if any, is
    /// released before the new one is created.
    fn install_midstate(&mut self, midstate: &Midstate) -> Result<(), ComputeError>;

    /// Test `[cursor, cursor + batch_size)` against the mask and block until
    /// the flags are back on the host. Flag `i` belongs to nonce `cursor + i`.
    fn submit_batch(&mut self, cursor: u64, difficulty_mask: u32) -> Result<Vec<bool>, ComputeError>;
}

impl<C: ComputeContext + ?Sized> ComputeContext for Box<C> {
    fn batch_size(&self) -> u32 {
        (**self).batch_size()
    }

    fn install_midstate(&mut self, midstate: &Midstate) -> Result<(), ComputeError> {
        (**self).install_midstate(midstate)
    }

    fn submit_batch(&mut self, cursor: u64, difficulty_mask: u32) -> Result<Vec<bool>, ComputeError> {
        (**self).submit_batch(cursor, difficulty_mask)
    }
}
