//! The iterative parallel lookup: given a target key, converge on the K
//! closest live nodes network-wide, contacting at most α in parallel per
//! round.

use crate::contact::Contact;
use crate::error::Error;
use crate::id::Id;
use crate::node::Node;
use std::time::Duration;
use tracing::{debug, trace};

/// Which RPC a lookup round issues. FIND_VALUE can short-circuit the whole
/// lookup; FIND_NODE never does.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    FindNode,
    FindValue,
}

/// Outcome of a lookup: either a value was found (with the contact that
/// held it), or the K closest live contacts discovered along the way.
pub struct QueryReturn {
    pub found: bool,
    pub contacts: Vec<Contact>,
    pub value: Option<String>,
    pub found_by: Option<Contact>,
}

pub struct Router {
    alpha: usize,
    k: usize,
    rpc_timeout: Duration,
}

impl Router {
    pub fn new(alpha: usize, k: usize, rpc_timeout: Duration) -> Self {
        Router {
            alpha,
            k,
            rpc_timeout,
        }
    }

    /// Returns the non-empty bucket whose low bound is closest by XOR to
    /// `key`. Used by bucket refresh; fails on a wholly empty routing
    /// table (bootstrap has not happened yet).
    pub async fn find_closest_nonempty_kbucket_low(
        &self,
        node: &Node,
        key: &Id,
    ) -> Result<Id, Error> {
        let bucket_list = node.bucket_list().read().await;
        bucket_list
            .buckets()
            .iter()
            .filter(|b| !b.contacts().is_empty())
            .map(|b| b.low())
            .min_by_key(|low| low.distance(key))
            .ok_or(Error::AllKBucketsAreEmpty)
    }

    pub async fn lookup(&self, node: &Node, key: Id, kind: LookupKind) -> QueryReturn {
        let our_id = node.id();
        let our_distance = our_id.distance(&key);

        let all_nodes = node
            .bucket_list()
            .read()
            .await
            .get_close_contacts(&key, &our_id);

        let nodes_to_query: Vec<Contact> = all_nodes.iter().take(self.alpha).cloned().collect();

        let mut closer_contacts: Vec<Contact> = Vec::new();
        let mut further_contacts: Vec<Contact> = Vec::new();
        for c in &nodes_to_query {
            if c.id.distance(&key) < our_distance {
                closer_contacts.push(c.clone());
            } else {
                further_contacts.push(c.clone());
            }
        }
        for c in all_nodes.iter().skip(self.alpha) {
            further_contacts.push(c.clone());
        }

        let mut contacted: Vec<Contact> = nodes_to_query.clone();

        let result = self
            .query(
                node,
                key,
                &nodes_to_query,
                kind,
                &mut closer_contacts,
                &mut further_contacts,
            )
            .await;
        if result.found {
            return result;
        }

        let mut ret: Vec<Contact> = Vec::new();
        merge_into(&mut ret, &closer_contacts);

        let mut have_work = true;
        while ret.len() < self.k && have_work {
            let closer_uncontacted: Vec<Contact> = closer_contacts
                .iter()
                .filter(|c| !contacted.iter().any(|x| x.id == c.id))
                .cloned()
                .collect();
            let further_uncontacted: Vec<Contact> = further_contacts
                .iter()
                .filter(|c| !contacted.iter().any(|x| x.id == c.id))
                .cloned()
                .collect();

            let have_closer = !closer_uncontacted.is_empty();
            let have_further = !further_uncontacted.is_empty();
            have_work = have_closer || have_further;
            if !have_work {
                break;
            }

            // Prefer closer uncontacted nodes; fall back to the wider
            // search over further uncontacted nodes when none remain.
            let batch: Vec<Contact> = if have_closer {
                closer_uncontacted.into_iter().take(self.alpha).collect()
            } else {
                further_uncontacted.into_iter().take(self.alpha).collect()
            };
            for c in &batch {
                contacted.push(c.clone());
            }

            let round_result = self
                .query(node, key, &batch, kind, &mut closer_contacts, &mut further_contacts)
                .await;
            if round_result.found {
                return round_result;
            }

            merge_into(&mut ret, &closer_contacts);
        }

        ret.sort_by_key(|c| c.id.distance(&key));
        ret.truncate(self.k);
        QueryReturn {
            found: false,
            contacts: ret,
            value: None,
            found_by: None,
        }
    }

    /// Fans out `kind` to every contact in `targets` concurrently, awaits
    /// all of them (the round barrier), and folds each response into
    /// `closer`/`further` in sequence so their mutation is serialized.
    async fn query(
        &self,
        node: &Node,
        key: Id,
        targets: &[Contact],
        kind: LookupKind,
        closer: &mut Vec<Contact>,
        further: &mut Vec<Contact>,
    ) -> QueryReturn {
        let our_contact = node.our_contact().clone();
        let our_id = node.id();

        let calls = targets.iter().cloned().map(|target| {
            let sender = our_contact.clone();
            let timeout = self.rpc_timeout;
            async move {
                let outcome = tokio::time::timeout(timeout, call_rpc(&target, sender, key, kind))
                    .await
                    .unwrap_or_else(|_| Err(Error::Rpc("rpc timed out".into())));
                (target, outcome)
            }
        });

        let responses = futures::future::join_all(calls).await;

        let mut found = false;
        let mut value = None;
        let mut found_by = None;

        for (target, outcome) in responses {
            let (peers, val) = match outcome {
                Ok(v) => v,
                Err(e) => {
                    trace!(peer = %target.id, error = %e, "rpc failed, treating as unresponsive");
                    continue;
                }
            };
            let had_value = merge_response(our_id, &target, key, peers, val.clone(), closer, further);
            if had_value && !found {
                found = true;
                value = val;
                found_by = Some(target);
            }
        }

        if found {
            debug!(key = %key, "lookup converged on a value");
        }

        QueryReturn {
            found,
            contacts: closer.clone(),
            value,
            found_by,
        }
    }
}

fn merge_into(ret: &mut Vec<Contact>, closer: &[Contact]) {
    for c in closer {
        if !ret.iter().any(|r| r.id == c.id) {
            ret.push(c.clone());
        }
    }
}

/// `get_closer_nodes`: filters the response to peers distinct from our own
/// ID and from the queried node, then classifies each by whether it is
/// strictly closer to `key` than the queried node was. Returns whether the
/// response carried a value (a FIND_VALUE hit).
fn merge_response(
    our_id: Id,
    queried: &Contact,
    key: Id,
    peers: Vec<Contact>,
    value: Option<String>,
    closer: &mut Vec<Contact>,
    further: &mut Vec<Contact>,
) -> bool {
    let d_queried = queried.id.distance(&key);
    let candidates: Vec<Contact> = peers
        .into_iter()
        .filter(|p| p.id != our_id && p.id != queried.id)
        .collect();

    for p in &candidates {
        if p.id.distance(&key) < d_queried && !closer.iter().any(|c| c.id == p.id) {
            closer.push(p.clone());
        }
    }
    for p in &candidates {
        if p.id.distance(&key) >= d_queried && !further.iter().any(|c| c.id == p.id) {
            further.push(p.clone());
        }
    }

    value.is_some()
}

async fn call_rpc(
    target: &Contact,
    sender: Contact,
    key: Id,
    kind: LookupKind,
) -> Result<(Vec<Contact>, Option<String>), Error> {
    match kind {
        LookupKind::FindNode => target
            .protocol
            .find_node(sender, key)
            .await
            .map(|contacts| (contacts, None)),
        LookupKind::FindValue => target
            .protocol
            .find_value(sender, key)
            .await
            .map(|response| (response.contacts, response.value)),
    }
}
