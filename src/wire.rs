use thiserror::Error;

use crate::types::{Job, PREHASH_LEN, Share};

/// `difficulty_mask (4) | start_nonce (8) | prehash (64)`
pub const JOB_PACKET_LEN: usize = 4 + 8 + PREHASH_LEN;
/// `prehash (64) | nonce (8)`
pub const SHARE_PACKET_LEN: usize = PREHASH_LEN + 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("wrong packet size (expected {expected}, but got {got})")]
    ShortPacket { expected: usize, got: usize },
}

/// Decode one job packet. A single read must carry the whole packet; fewer
/// bytes are rejected and not kept for a later read.
pub fn decode_job(buf: &[u8]) -> Result<Job, DecodeError> {
    if buf.len() < JOB_PACKET_LEN {
        return Err(DecodeError::ShortPacket { expected: JOB_PACKET_LEN, got: buf.len() });
    }
    let difficulty_mask = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&buf[4..12]);
    let mut prehash = [0u8; PREHASH_LEN];
    prehash.copy_from_slice(&buf[12..JOB_PACKET_LEN]);
    Ok(Job::new(difficulty_mask, u64::from_be_bytes(nonce), prehash))
}

pub fn encode_job(job: &Job) -> [u8; JOB_PACKET_LEN] {
    let mut out = [0u8; JOB_PACKET_LEN];
    out[..4].copy_from_slice(&job.difficulty_mask.to_be_bytes());
    out[4..12].copy_from_slice(&job.start_nonce.to_be_bytes());
    out[12..].copy_from_slice(&job.prehash);
    out
}

pub fn encode_share(share: &Share) -> [u8; SHARE_PACKET_LEN] {
    let mut out = [0u8; SHARE_PACKET_LEN];
    out[..PREHASH_LEN].copy_from_slice(&share.prehash);
    out[PREHASH_LEN..].copy_from_slice(&share.nonce.to_be_bytes());
    out
}

pub fn decode_share(buf: &[u8]) -> Result<Share, DecodeError> {
    if buf.len() < SHARE_PACKET_LEN {
        return Err(DecodeError::ShortPacket { expected: SHARE_PACKET_LEN, got: buf.len() });
    }
    let mut prehash = [0u8; PREHASH_LEN];
    prehash.copy_from_slice(&buf[..PREHASH_LEN]);
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&buf[PREHASH_LEN..SHARE_PACKET_LEN]);
    Ok(Share { prehash, nonce: u64::from_be_bytes(nonce) })
}
