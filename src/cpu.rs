use crate::compute::{ComputeContext, ComputeError};
use crate::sha::{self, Midstate};
use crate::types::WorkDims;

pub struct CpuExec {
    dims: WorkDims,
    midstate: Option<Midstate>,
}

impl CpuExec {
    pub fn new(dims: WorkDims) -> Self {
        Self { dims, midstate: None }
    }
}

impl ComputeContext for CpuExec {
    fn batch_size(&self) -> u32 {
        self.dims.batch_size()
    }

    fn install_midstate(&mut self, midstate: &Midstate) -> Result<(), ComputeError> {
        self.midstate = Some(*midstate);
        Ok(())
    }

    fn submit_batch(&mut self, cursor: u64, difficulty_mask: u32) -> Result<Vec<bool>, ComputeError> {
        let midstate = self.midstate.as_ref().ok_or(ComputeError::NoMidstate)?;
        let found = (0..self.batch_size() as u64)
            .map(|lane| {
                let nonce = cursor.wrapping_add(lane);
                sha::meets_difficulty(sha::hash_output(midstate, nonce), difficulty_mask)
            })
            .collect();
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mask_sets_every_lane() {
        let mut cpu = CpuExec::new(WorkDims::new(2, 2, 2));
        cpu.install_midstate(&sha::midstate(&[0u8; 64])).unwrap();
        let found = cpu.submit_batch(0, 0).unwrap();
        assert_eq!(found, vec![true; 8]);
    }

    #[test]
    fn lane_i_tests_cursor_plus_i() {
        let mid = sha::midstate(&[3u8; 64]);
        let mut cpu = CpuExec::new(WorkDims::new(4, 2, 1));
        cpu.install_midstate(&mid).unwrap();

        let mask = 0x8000_0000;
        let found = cpu.submit_batch(1_000, mask).unwrap();
        for (i, flag) in found.iter().enumerate() {
            let expected = sha::hash_output(&mid, 1_000 + i as u64) & mask == 0;
            assert_eq!(*flag, expected, "lane {i}");
        }
    }

    #[test]
    fn full_mask_on_many_lanes_is_selective() {
        let mut cpu = CpuExec::new(WorkDims::new(256, 1, 1));
        cpu.install_midstate(&sha::midstate(&[9u8; 64])).unwrap();
        let found = cpu.submit_batch(0, 0xff00_0000).unwrap();
        // Expected hit rate is 1/256; all-true would mean the mask is ignored.
        assert!(found.iter().filter(|&&f| f).count() < found.len());
    }

    #[test]
    fn submit_without_midstate_fails() {
        let mut cpu = CpuExec::new(WorkDims::new(1, 1, 1));
        assert!(matches!(cpu.submit_batch(0, 0), Err(ComputeError::NoMidstate)));
    }
}
