use sha2::compress256;
use sha2::digest::generic_array::GenericArray;

const H0: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a,
    0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

/// Bit length of `prehash || nonce`, the whole message the kernel hashes.
const MESSAGE_BITS: u64 = (64 + 8) * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Midstate(pub [u32; 8]);

pub fn midstate(prehash: &[u8; 64]) -> Midstate {
    let mut state = H0;
    compress256(&mut state, &[GenericArray::clone_from_slice(prehash)]);
    Midstate(state)
}

/// Finish `SHA-256(prehash || nonce_be)` from the midstate. This is the host
/// mirror of the search kernel.
pub fn finish(midstate: &Midstate, nonce: u64) -> [u32; 8] {
    let mut block = [0u8; 64];
    block[..8].copy_from_slice(&nonce.to_be_bytes());
    block[8] = 0x80;
    block[56..].copy_from_slice(&MESSAGE_BITS.to_be_bytes());

    let mut state = midstate.0;
    compress256(&mut state, &[GenericArray::clone_from_slice(&block)]);
    state
}

/// The 32-bit value the difficulty mask is tested against: the first
/// big-endian word of the digest.
pub fn hash_output(midstate: &Midstate, nonce: u64) -> u32 {
    finish(midstate, nonce)[0]
}

pub fn meets_difficulty(hash_output: u32, difficulty_mask: u32) -> bool {
    hash_output & difficulty_mask == 0
}
