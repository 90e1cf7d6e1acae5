use proptest::prelude::*;

use vela_types::{Address, Hash, Timestamp, EPOCH_INTERVAL};

proptest! {
    /// Address roundtrip: new -> as_bytes -> new produces identical address.
    #[test]
    fn address_roundtrip(bytes in prop::array::uniform20(0u8..)) {
        let addr = Address::new(bytes);
        prop_assert_eq!(addr.as_bytes(), &bytes);
    }

    /// Address RLP roundtrip.
    #[test]
    fn address_rlp_roundtrip(bytes in prop::array::uniform20(0u8..)) {
        let addr = Address::new(bytes);
        let encoded = rlp::encode(&addr);
        let decoded: Address = rlp::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, addr);
    }

    /// Hash RLP roundtrip.
    #[test]
    fn hash_rlp_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        let encoded = rlp::encode(&hash);
        let decoded: Hash = rlp::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Hash::is_zero is true only for all-zero bytes.
    #[test]
    fn hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = Hash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Address ordering agrees with byte-wise ordering.
    #[test]
    fn address_ordering_bytewise(a in prop::array::uniform20(0u8..), b in prop::array::uniform20(0u8..)) {
        let aa = Address::new(a);
        let ab = Address::new(b);
        prop_assert_eq!(aa.cmp(&ab), a.cmp(&b));
    }

    /// Timestamp epoch matches integer division by the epoch interval.
    #[test]
    fn timestamp_epoch_division(secs in 0u64..u64::MAX / 2) {
        prop_assert_eq!(Timestamp::new(secs).epoch(), secs / EPOCH_INTERVAL);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        prop_assert_eq!(Timestamp::new(a) <= Timestamp::new(b), a <= b);
    }
}
