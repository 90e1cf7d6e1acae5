//! Half-byte path utilities.
//!
//! Trie paths are sequences of nibbles (values 0–15). On disk a path is
//! packed with the hex-prefix encoding, whose flag nibble records both the
//! parity of the path and whether the node is a leaf.

/// Expand a byte key into its nibble path (high nibble first).
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    nibbles
}

/// Pack an even-length nibble path back into bytes.
pub fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
    debug_assert!(nibbles.len() % 2 == 0, "byte keys have even nibble counts");
    nibbles
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | (pair[1] & 0x0f))
        .collect()
}

/// Length of the longest common prefix of two nibble paths.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Hex-prefix encode a nibble path.
///
/// Flag bits: `0b10` marks a leaf, `0b01` marks an odd-length path whose
/// first nibble shares the flag byte.
pub fn hp_encode(nibbles: &[u8], leaf: bool) -> Vec<u8> {
    let flag = if leaf { 2u8 } else { 0u8 };
    let mut out = Vec::with_capacity(nibbles.len() / 2 + 1);
    let rest = if nibbles.len() % 2 == 1 {
        out.push(((flag | 1) << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        out.push(flag << 4);
        nibbles
    };
    for pair in rest.chunks_exact(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
    out
}

/// Decode a hex-prefix path; returns the nibbles and the leaf flag.
pub fn hp_decode(bytes: &[u8]) -> Option<(Vec<u8>, bool)> {
    let first = *bytes.first()?;
    let flag = first >> 4;
    if flag > 3 {
        return None;
    }
    let leaf = flag & 2 != 0;
    let odd = flag & 1 != 0;
    if !odd && first & 0x0f != 0 {
        return None;
    }

    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    if odd {
        nibbles.push(first & 0x0f);
    }
    for b in &bytes[1..] {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    Some((nibbles, leaf))
}
