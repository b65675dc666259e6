// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The grill's stateful, byte-evolving XOR cipher plus the time-bucketed
//! key derivation and hex helpers built on top of it.
//!
//! Two base keys are in play: [`FILE_DECODE_KEY`] decrypts the password
//! served from `/extconfig.json`, and [`RPC_AUTH_KEY_BASE`] derives the
//! per-tick RPC auth tokens (see `auth.rs`).

use rand::Rng;

/// Base key for decrypting the `/extconfig.json` password blob.
pub const FILE_DECODE_KEY: [u8; 8] = [0x4a, 0x9f, 0x1c, 0xe2, 0x77, 0x03, 0xb8, 0x5d];

/// Base key for deriving RPC auth tokens from the plaintext password.
pub const RPC_AUTH_KEY_BASE: [u8; 8] = [0x91, 0x2e, 0x6b, 0x14, 0xd8, 0x47, 0xa0, 0xc3];

const PADDING_MARKER: u8 = 0xff;
const PADDING_MARKER_REPLACEMENT: u8 = 0xfe;

/// Runs the stateful XOR cipher over `data`.
///
/// `rpc_mode` selects whether key evolution feeds on the emitted
/// ciphertext byte or the call's own input byte; see the module-level
/// note below for why this makes the cipher round-trip cleanly only when
/// `rpc_mode` is `false`.
///
/// ## The `rpc_mode = true` asymmetry
///
/// The evolved key slot at step `i` is exactly the slot read at step
/// `i + 1`, so the two passes of a round trip diverge from the second
/// byte onward unless `src` resolves to the same value on both passes.
/// When padding is added (the encrypt side), `src` is always the emitted
/// byte — i.e. the ciphertext byte, which is also what the decrypt side
/// sees as its input. That keeps the two key schedules in lockstep when
/// `rpc_mode` is `false`. When `rpc_mode` is `true`, the decrypt side's
/// `src` is instead its *own* emitted (plaintext) byte, which generally
/// differs from the ciphertext byte the encrypt side evolved on — the
/// schedules diverge and the round trip does not recover `data`. Every
/// real call site in this crate uses `rpc_mode = true` one-way only (RPC
/// token generation, never decoded back by us), so this is inert in
/// practice; see `codec_tests.rs` for the property test scoped
/// accordingly.
pub fn codec(data: &[u8], key: [u8; 8], padding_len: usize, rpc_mode: bool) -> Vec<u8> {
    let mut input = Vec::with_capacity(padding_len + 1 + data.len());
    let padding_added = padding_len > 0;
    if padding_added {
        let mut rng = rand::rng();
        for _ in 0..padding_len {
            let b: u8 = rng.random();
            input.push(if b == PADDING_MARKER { PADDING_MARKER_REPLACEMENT } else { b });
        }
        input.push(PADDING_MARKER);
    }
    input.extend_from_slice(data);

    let mut schedule = key;
    let mut out = Vec::with_capacity(input.len());
    for (zero_based, &byte) in input.iter().enumerate() {
        let i = zero_based + 1;
        let read_idx = (i - 1) % 8;
        let k = schedule[read_idx];
        let m = byte ^ k;
        out.push(m);

        let src = if padding_added || rpc_mode { m } else { byte };
        let evolve_idx = i % 8;
        schedule[evolve_idx] =
            ((schedule[evolve_idx] ^ src) as u32 + (i as u32 - 1)) as u8;
    }

    if padding_len == 0 {
        if let Some(marker_pos) = out.iter().position(|&b| b == PADDING_MARKER) {
            return out.split_off(marker_pos + 1);
        }
    }
    out
}

/// Derives the 8-byte key schedule used by [`codec`] for base key `base`
/// at time bucket `t`.
pub fn get_codec_key(base: [u8; 8], t: u32) -> [u8; 8] {
    let mut remaining: Vec<u8> = base.to_vec();
    let mut l: u64 = t as u64;
    let mut out = Vec::with_capacity(8);

    while remaining.len() > 1 {
        let p = (l % remaining.len() as u64) as usize;
        let removed = remaining.remove(p);
        out.push(removed ^ (l as u8));
        l = ((l * removed as u64) + removed as u64) % 256;
    }
    out.push(remaining[0]);

    let mut key = [0u8; 8];
    key.copy_from_slice(&out);
    key
}

/// Maps an uptime reading (seconds) to the coarse time bucket the grill
/// and controller must agree on for a given tick.
pub fn get_codec_time(uptime_seconds: u64) -> u32 {
    let safe = uptime_seconds.saturating_sub(5);
    let safe = if safe > i32::MAX as u64 { safe % 86_400 } else { safe };
    (safe / 10) as u32
}

/// Decodes a hex string leniently: two nibbles per byte, with any
/// unrecognised nibble contributing zero rather than aborting. Odd-length
/// input has its trailing nibble paired with an implicit zero.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => 0,
        }
    }

    let bytes = hex.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut chunks = bytes.chunks(2);
    for chunk in &mut chunks {
        let hi = nibble(chunk[0]);
        let lo = if chunk.len() == 2 { nibble(chunk[1]) } else { 0 };
        out.push((hi << 4) | lo);
    }
    out
}

/// Encodes `bytes` as lowercase hex.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
