//! Jenkins lookup3 hashing
//!
//! Port of `hashlittle()` and `hashlittle2()` from Bob Jenkins' lookup3.c.
//! CASC uses the dual 32-bit variant to derive the 64-bit filename hashes
//! found in root tables.

use std::fmt;

/// 64-bit filename hash plus the primary 32-bit lane it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Jenkins96 {
    /// `(pc << 32) | pb`
    pub hash64: u64,
    /// `pc`
    pub hash32: u32,
}

impl Jenkins96 {
    /// Hash `data` with both seeds at zero.
    pub fn hash(data: &[u8]) -> Self {
        let (pc, pb) = lookup3(data, 0, 0);
        Self {
            hash64: (u64::from(pc) << 32) | u64::from(pb),
            hash32: pc,
        }
    }

    /// Create from raw components
    pub const fn from_parts(hash64: u64, hash32: u32) -> Self {
        Self { hash64, hash32 }
    }
}

impl fmt::Display for Jenkins96 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}:{:08x}", self.hash64, self.hash32)
    }
}

/// Single 32-bit lookup3 hash of `data` seeded with `initval`.
///
/// ```
/// use cascette_crypto::jenkins::hashlittle;
///
/// assert_eq!(hashlittle(b"", 0), 0xdead_beef);
/// ```
pub fn hashlittle(data: &[u8], initval: u32) -> u32 {
    lookup3(data, initval, 0).0
}

/// Dual 32-bit lookup3 hash. `pc` and `pb` are seeds on input and the two
/// hash lanes on output.
///
/// ```
/// use cascette_crypto::jenkins::hashlittle2;
///
/// let (mut pc, mut pb) = (0u32, 0u32);
/// hashlittle2(b"test data", &mut pc, &mut pb);
/// assert_ne!(pc, pb);
/// ```
pub fn hashlittle2(data: &[u8], pc: &mut u32, pb: &mut u32) {
    let (c, b) = lookup3(data, *pc, *pb);
    *pc = c;
    *pb = b;
}

fn lookup3(data: &[u8], pc: u32, pb: u32) -> (u32, u32) {
    let len = u32::try_from(data.len()).unwrap_or(u32::MAX);
    let mut a = 0xdead_beef_u32.wrapping_add(len).wrapping_add(pc);
    let mut b = a;
    let mut c = a.wrapping_add(pb);

    if data.is_empty() {
        return (c, b);
    }

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(le_word(&rest[0..4]));
        b = b.wrapping_add(le_word(&rest[4..8]));
        c = c.wrapping_add(le_word(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }

    // 1..=12 trailing bytes; missing bytes contribute zero
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(le_word(&tail[0..4]));
    b = b.wrapping_add(le_word(&tail[4..8]));
    c = c.wrapping_add(le_word(&tail[8..12]));
    final_mix(&mut a, &mut b, &mut c);

    (c, b)
}

fn le_word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c) ^ c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c) ^ c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a) ^ a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b) ^ b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(14));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(11));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(25));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(16));
    *a = (*a ^ *c).wrapping_sub(c.rotate_left(4));
    *b = (*b ^ *a).wrapping_sub(a.rotate_left(14));
    *c = (*c ^ *b).wrapping_sub(b.rotate_left(24));
}
