//! A bounded list of contacts covering a contiguous slice of the ID space.

use crate::contact::Contact;
use crate::error::Error;
use crate::id::Id;

/// `[low, high]` inclusive range of IDs this bucket is responsible for, plus
/// an ordered list of contacts (insertion order; most-recently-touched
/// last, so sorting by `last_seen` yields the staleness ranking).
pub struct KBucket {
    low: Id,
    high: Id,
    k: usize,
    contacts: Vec<Contact>,
    touched_at: u64,
}

impl KBucket {
    pub fn new(low: Id, high: Id, k: usize) -> Self {
        KBucket {
            low,
            high,
            k,
            contacts: Vec::new(),
            touched_at: now_unix(),
        }
    }

    pub fn low(&self) -> Id {
        self.low
    }

    pub fn high(&self) -> Id {
        self.high
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.k
    }

    pub fn is_in_range(&self, id: &Id) -> bool {
        self.low <= *id && *id <= self.high
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.contacts.iter().any(|c| c.id == *id)
    }

    pub fn touch(&mut self) {
        self.touched_at = now_unix();
    }

    pub fn touched_at(&self) -> u64 {
        self.touched_at
    }

    pub fn add_contact(&mut self, contact: Contact) -> Result<(), Error> {
        if self.is_full() {
            return Err(Error::TooManyContacts {
                len: self.contacts.len(),
            });
        }
        if !self.is_in_range(&contact.id) {
            return Err(Error::OutOfRange);
        }
        self.contacts.push(contact);
        Ok(())
    }

    /// Overwrites the existing entry for `contact.id` and touches it.
    /// No-op if the contact is not already present (the caller, BucketList,
    /// establishes the precondition via `contains` first).
    pub fn replace_contact(&mut self, mut contact: Contact) {
        if let Some(pos) = self.contacts.iter().position(|c| c.id == contact.id) {
            contact.touch();
            self.contacts[pos] = contact;
        }
    }

    /// The staleness leader: the contact with the smallest `last_seen`.
    pub fn least_recently_seen(&self) -> Option<&Contact> {
        self.contacts.iter().min_by_key(|c| c.last_seen())
    }

    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let pos = self.contacts.iter().position(|c| c.id == *id)?;
        Some(self.contacts.remove(pos))
    }

    /// Length of the longest binary prefix shared by every contact's ID,
    /// over the fixed 160-bit representation. A singleton bucket shares
    /// its entire width with itself; this never truncates leading zeros
    /// the way a naive `bin()`-based implementation would.
    pub fn depth(&self) -> usize {
        match self.contacts.split_first() {
            None => 0,
            Some((first, rest)) => rest
                .iter()
                .map(|c| first.id.shared_prefix_len(&c.id))
                .min()
                .unwrap_or(crate::id::BIT_LEN),
        }
    }

    /// Splits this bucket into two at the high median of its contacts' IDs
    /// (not the numeric midpoint of `[low, high]`) — this guarantees both
    /// halves receive at least one contact even when the population is
    /// bunched against one side of the range.
    pub fn split(&self) -> Result<(KBucket, KBucket), Error> {
        let mut sorted_ids: Vec<Id> = self.contacts.iter().map(|c| c.id).collect();
        sorted_ids.sort();
        let midpoint = sorted_ids[sorted_ids.len() / 2];

        let mut k1 = KBucket::new(self.low, midpoint, self.k);
        let mut k2 = KBucket::new(midpoint, self.high, self.k);
        for contact in &self.contacts {
            if contact.id < midpoint {
                k1.add_contact(contact.clone())?;
            } else {
                k2.add_contact(contact.clone())?;
            }
        }
        Ok((k1, k2))
    }
}

fn now_unix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VirtualProtocol;
    use std::sync::Arc;

    fn contact_with_id(byte: u8) -> Contact {
        let id = Id::from_bytes([byte; crate::id::BYTE_LEN]);
        // A Contact needs a Protocol handle; tests never dispatch through
        // it, so an unresponsive virtual protocol pointed at a throwaway
        // node is enough padding to satisfy the type.
        let storage = Arc::new(crate::storage::InMemoryStorage::new());
        let node = crate::node::Node::new(Id::max(), storage);
        Contact::new(id, Arc::new(VirtualProtocol::unresponsive(node)))
    }

    #[test]
    fn full_bucket_rejects_new_contact() {
        let mut bucket = KBucket::new(Id::zero(), Id::max(), 2);
        bucket.add_contact(contact_with_id(1)).unwrap();
        bucket.add_contact(contact_with_id(2)).unwrap();
        let err = bucket.add_contact(contact_with_id(3)).unwrap_err();
        assert!(matches!(err, Error::TooManyContacts { len: 2 }));
    }

    #[test]
    fn out_of_range_contact_is_rejected() {
        let mut bucket = KBucket::new(Id::zero(), Id::mid(), 20);
        let err = bucket.add_contact(contact_with_id(0xff)).unwrap_err();
        assert!(matches!(err, Error::OutOfRange));
    }

    #[test]
    fn split_divides_contacts_without_loss() {
        let mut bucket = KBucket::new(Id::zero(), Id::max(), 20);
        for byte in 0..10u8 {
            bucket.add_contact(contact_with_id(byte * 20)).unwrap();
        }
        let (k1, k2) = bucket.split().unwrap();
        assert!(!k1.contacts().is_empty());
        assert!(!k2.contacts().is_empty());
        assert_eq!(k1.contacts().len() + k2.contacts().len(), 10);
    }

    #[test]
    fn replace_contact_bumps_last_seen_without_duplicating() {
        let mut bucket = KBucket::new(Id::zero(), Id::max(), 20);
        let c = contact_with_id(42);
        bucket.add_contact(c.clone()).unwrap();
        let t0 = bucket.contacts()[0].last_seen();
        std::thread::sleep(std::time::Duration::from_millis(10));
        bucket.replace_contact(c.clone());
        assert_eq!(bucket.contacts().len(), 1);
        assert!(bucket.contacts()[0].last_seen() >= t0);
    }

    #[test]
    fn singleton_bucket_depth_is_full_width() {
        let mut bucket = KBucket::new(Id::zero(), Id::max(), 20);
        bucket.add_contact(contact_with_id(5)).unwrap();
        assert_eq!(bucket.depth(), crate::id::BIT_LEN);
    }
}
