pub const NONCE_SEARCH_KERNEL: &str = "nonce_search";

pub const NONCE_SEARCH: &str = r#"
#define ROTR(x, n) (((x) >> (n)) | ((x) << (32 - (n))))
#define CH(x, y, z) (((x) & (y)) ^ (~(x) & (z)))
#define MAJ(x, y, z) (((x) & (y)) ^ ((x) & (z)) ^ ((y) & (z)))
#define EP0(x) (ROTR(x, 2) ^ ROTR(x, 13) ^ ROTR(x, 22))
#define EP1(x) (ROTR(x, 6) ^ ROTR(x, 11) ^ ROTR(x, 25))
#define SIG0(x) (ROTR(x, 7) ^ ROTR(x, 18) ^ ((x) >> 3))
#define SIG1(x) (ROTR(x, 17) ^ ROTR(x, 19) ^ ((x) >> 10))

__constant uint K[64] = {
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2
};

// SHA-256(prehash || nonce_be) resumed from the prehash midstate. Only the
// final block is compressed: nonce, 0x80 pad, bit length 576.
__kernel void nonce_search(
    __global const uint* midstate,  // 8 words
    __global uchar*      found,     // one flag per lane
    const ulong cursor,
    const uint difficulty_mask
) {
    size_t lane = get_global_id(0)
        + get_global_size(0) * (get_global_id(1) + get_global_size(1) * get_global_id(2));
    ulong nonce = cursor + (ulong)lane;

    uint w[64];
    w[0] = (uint)(nonce >> 32);
    w[1] = (uint)nonce;
    w[2] = 0x80000000u;
    for (int i = 3; i < 15; ++i) w[i] = 0;
    w[15] = 576;
    for (int i = 16; i < 64; ++i) {
        w[i] = SIG1(w[i - 2]) + w[i - 7] + SIG0(w[i - 15]) + w[i - 16];
    }

    uint a = midstate[0], b = midstate[1], c = midstate[2], d = midstate[3];
    uint e = midstate[4], f = midstate[5], g = midstate[6], h = midstate[7];
    for (int i = 0; i < 64; ++i) {
        uint t1 = h + EP1(e) + CH(e, f, g) + K[i] + w[i];
        uint t2 = EP0(a) + MAJ(a, b, c);
        h = g; g = f; f = e; e = d + t1;
        d = c; c = b; b = a; a = t1 + t2;
    }

    uint out0 = midstate[0] + a;
    found[lane] = (out0 & difficulty_mask) == 0 ? 1 : 0;
}
"#;
