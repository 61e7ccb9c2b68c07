//! The 160-bit Kademlia node/key identifier and the XOR distance metric.

use rand::Rng;
use std::fmt;

/// Width of the ID space in bits, per the Kademlia parameter `B`.
pub const BIT_LEN: usize = 160;
/// Width of the ID space in bytes.
pub const BYTE_LEN: usize = 20;

/// An unsigned 160-bit integer, stored big-endian (byte 0 holds the most
/// significant 8 bits). Used both as a node/key identifier and, since XOR
/// over fixed-width integers is itself fixed-width, as the distance between
/// two identifiers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; BYTE_LEN]);

impl Id {
    pub fn from_bytes(bytes: [u8; BYTE_LEN]) -> Self {
        Id(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BYTE_LEN] {
        &self.0
    }

    pub fn zero() -> Self {
        Id([0u8; BYTE_LEN])
    }

    /// `2^160 - 1`.
    pub fn max() -> Self {
        Id([0xffu8; BYTE_LEN])
    }

    /// `2^159`, the midpoint of the ID space.
    pub fn mid() -> Self {
        let mut bytes = [0u8; BYTE_LEN];
        bytes[0] = 0x80;
        Id(bytes)
    }

    /// A uniformly random ID over the full space. Intended for tests; real
    /// node IDs should be derived from a stable identity, not regenerated.
    pub fn random(rng: &mut impl Rng) -> Self {
        let mut bytes = [0u8; BYTE_LEN];
        rng.fill(&mut bytes);
        Id(bytes)
    }

    /// XOR distance between two IDs, expressed as an ID-sized value so it
    /// can be compared and sorted like any other ID.
    pub fn distance(&self, other: &Id) -> Id {
        let mut out = [0u8; BYTE_LEN];
        for i in 0..BYTE_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Id(out)
    }

    /// Length of the longest common binary prefix shared with `other`,
    /// counted over the full fixed-width 160-bit representation (never
    /// truncated by skipping leading zero bytes).
    pub fn shared_prefix_len(&self, other: &Id) -> usize {
        let mut bits = 0usize;
        for i in 0..BYTE_LEN {
            let diff = self.0[i] ^ other.0[i];
            if diff == 0 {
                bits += 8;
                continue;
            }
            bits += diff.leading_zeros() as usize;
            break;
        }
        bits
    }

    fn leading_zero_bits(&self) -> usize {
        let mut bits = 0usize;
        for &byte in self.0.iter() {
            if byte == 0 {
                bits += 8;
                continue;
            }
            bits += byte.leading_zeros() as usize;
            break;
        }
        bits
    }

    /// self - other, assuming self >= other.
    fn sub(&self, other: &Id) -> Id {
        let mut out = [0u8; BYTE_LEN];
        let mut borrow = 0i16;
        for i in (0..BYTE_LEN).rev() {
            let a = self.0[i] as i16;
            let b = other.0[i] as i16 + borrow;
            if a < b {
                out[i] = (a + 256 - b) as u8;
                borrow = 1;
            } else {
                out[i] = (a - b) as u8;
                borrow = 0;
            }
        }
        Id(out)
    }

    /// self + other, saturating at `Id::max()`.
    fn add(&self, other: &Id) -> Id {
        let mut out = [0u8; BYTE_LEN];
        let mut carry = 0u16;
        for i in (0..BYTE_LEN).rev() {
            let sum = self.0[i] as u16 + other.0[i] as u16 + carry;
            out[i] = (sum & 0xff) as u8;
            carry = sum >> 8;
        }
        if carry != 0 {
            return Id::max();
        }
        Id(out)
    }

    fn mask_to_bit_len(&self, bit_len: usize) -> Id {
        let mut out = self.0;
        let bits_to_clear = BIT_LEN - bit_len;
        let full_bytes = bits_to_clear / 8;
        let remaining_bits = bits_to_clear % 8;
        for byte in out.iter_mut().take(full_bytes) {
            *byte = 0;
        }
        if remaining_bits > 0 {
            out[full_bytes] &= 0xffu8 >> remaining_bits;
        }
        Id(out)
    }

    /// `low + U[0, high - low]`, inclusive of both endpoints. Used by
    /// bucket refresh to pick a random key within a bucket's range.
    pub fn random_in_range(rng: &mut impl Rng, low: Id, high: Id) -> Id {
        if low >= high {
            return low;
        }
        let span = high.sub(&low);
        let bit_len = BIT_LEN - span.leading_zero_bits();
        if bit_len == 0 {
            return low;
        }
        loop {
            let mut bytes = [0u8; BYTE_LEN];
            rng.fill(&mut bytes);
            let candidate = Id(bytes).mask_to_bit_len(bit_len);
            if candidate <= span {
                return low.add(&candidate);
            }
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn xor_is_symmetric_and_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Id::random(&mut rng);
        let b = Id::random(&mut rng);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&a), Id::zero());
    }

    fn from_u64(v: u64) -> Id {
        let mut bytes = [0u8; BYTE_LEN];
        bytes[12..20].copy_from_slice(&v.to_be_bytes());
        Id(bytes)
    }

    fn to_u64(id: &Id) -> u64 {
        u64::from_be_bytes(id.0[12..20].try_into().unwrap())
    }

    #[test]
    fn xor_triangle_inequality_holds() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..256 {
            let a = from_u64(rng.gen());
            let b = from_u64(rng.gen());
            let c = from_u64(rng.gen());
            let ab = to_u64(&a.distance(&b));
            let bc = to_u64(&b.distance(&c));
            let ac = to_u64(&a.distance(&c));
            assert!(ac <= ab + bc);
        }
    }

    #[test]
    fn shared_prefix_len_full_width_for_equal_ids() {
        let a = Id::from_bytes([0x5a; BYTE_LEN]);
        assert_eq!(a.shared_prefix_len(&a), BIT_LEN);
    }

    #[test]
    fn shared_prefix_len_zero_when_top_bit_differs() {
        let a = Id::zero();
        let b = Id::mid();
        assert_eq!(a.shared_prefix_len(&b), 0);
    }

    #[test]
    fn random_in_range_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let low = Id::from_bytes([0x10; BYTE_LEN]);
        let high = Id::from_bytes([0x20; BYTE_LEN]);
        for _ in 0..256 {
            let id = Id::random_in_range(&mut rng, low, high);
            assert!(id >= low && id <= high);
        }
    }

    #[test]
    fn random_in_range_degenerate_returns_low() {
        let mut rng = StdRng::seed_from_u64(4);
        let point = Id::from_bytes([0x42; BYTE_LEN]);
        assert_eq!(Id::random_in_range(&mut rng, point, point), point);
    }
}
