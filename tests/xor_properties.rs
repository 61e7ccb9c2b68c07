//! Property-based checks for the XOR metric (symmetry and identity) across
//! randomly generated 160-bit ids. The triangle inequality is checked in
//! `id.rs`'s own unit tests over a 64-bit-embedded subset, where ordinary
//! integer arithmetic is available to compute the bound being tested.

use kadmesh::Id;
use proptest::prelude::*;

fn arb_id() -> impl Strategy<Value = Id> {
    any::<[u8; 20]>().prop_map(Id::from_bytes)
}

proptest! {
    #[test]
    fn xor_distance_is_symmetric(a in arb_id(), b in arb_id()) {
        prop_assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn xor_distance_to_self_is_zero(a in arb_id()) {
        prop_assert_eq!(a.distance(&a), Id::zero());
    }

    #[test]
    fn xor_distance_is_involutive(a in arb_id(), b in arb_id()) {
        // distance(a, b) xored with b gets back to a: the metric is its own
        // inverse operation, the property the routing table relies on when
        // it reconstructs "who is this far from the key" during a split.
        let d = a.distance(&b);
        prop_assert_eq!(d.distance(&b), a);
    }
}
