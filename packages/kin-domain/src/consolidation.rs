//! Primary election and merge planning for a resolved contact cluster.
//!
//! Everything here is pure: the caller resolves the cluster, hands it over together with the
//! observation, and applies the returned writes in order.

use crate::{
	contact::{Contact, LinkPrecedence},
	observation::Observation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
	pub email: Option<String>,
	pub phone_number: Option<String>,
	pub linked_id: Option<i64>,
	pub link_precedence: LinkPrecedence,
}

/// Re-point `id` at `primary_id` as a secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkUpdate {
	pub id: i64,
	pub primary_id: i64,
	/// The member was a primary of its own cluster before this merge.
	pub demoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	/// Turn the elected member back into a primary. Only happens when its former primary is no
	/// longer live.
	Promote(i64),
	Link(LinkUpdate),
	Create(NewContact),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
	/// `None` when the cluster was empty and the primary is the contact created by `writes`.
	pub primary_id: Option<i64>,
	/// At most one promotion, then link updates, then at most one creation.
	pub writes: Vec<Mutation>,
	/// Ids of pre-existing members, ascending. A created contact is not included.
	pub cluster_ids: Vec<i64>,
}
impl Consolidation {
	pub fn is_noop(&self) -> bool {
		self.writes.is_empty()
	}

	pub fn merged(&self) -> usize {
		self.writes
			.iter()
			.filter(|write| matches!(write, Mutation::Link(LinkUpdate { demoted: true, .. })))
			.count()
	}
}

/// Advisory lock keys for the primaries `cluster` currently hangs off: every member marked
/// primary plus every `linked_id` target. Sorted and deduplicated.
///
/// Two observations with disjoint values can still touch the same primary, one merging it away
/// while the other links a new secondary to it. Holding these keys serializes the two.
pub fn cluster_lock_keys(cluster: &[Contact]) -> Vec<String> {
	let mut ids = cluster
		.iter()
		.filter_map(|contact| if contact.is_primary() { Some(contact.id) } else { contact.linked_id })
		.collect::<Vec<_>>();

	ids.sort_unstable();
	ids.dedup();

	ids.into_iter().map(|id| format!("contact:{id}")).collect()
}

pub fn consolidate(cluster: &[Contact], observation: &Observation) -> Consolidation {
	let mut ordered = cluster.iter().collect::<Vec<_>>();

	ordered.sort_by_key(|contact| contact.election_key());
	ordered.dedup_by_key(|contact| contact.id);

	let mut cluster_ids = ordered.iter().map(|contact| contact.id).collect::<Vec<_>>();

	cluster_ids.sort_unstable();

	let Some(primary) = ordered.first().copied() else {
		return Consolidation {
			primary_id: None,
			writes: vec![Mutation::Create(NewContact {
				email: observation.email.clone(),
				phone_number: observation.phone_number.clone(),
				linked_id: None,
				link_precedence: LinkPrecedence::Primary,
			})],
			cluster_ids,
		};
	};
	let mut writes = Vec::new();

	if !primary.is_primary() {
		writes.push(Mutation::Promote(primary.id));
	}

	for member in ordered.iter().skip(1) {
		if member.is_linked_to(primary.id) {
			continue;
		}

		writes.push(Mutation::Link(LinkUpdate {
			id: member.id,
			primary_id: primary.id,
			demoted: member.is_primary(),
		}));
	}

	let email_known = observation
		.email
		.as_deref()
		.is_none_or(|email| ordered.iter().any(|contact| contact.email.as_deref() == Some(email)));
	let phone_known = observation.phone_number.as_deref().is_none_or(|phone_number| {
		ordered.iter().any(|contact| contact.phone_number.as_deref() == Some(phone_number))
	});

	if !email_known || !phone_known {
		writes.push(Mutation::Create(NewContact {
			email: observation.email.clone(),
			phone_number: observation.phone_number.clone(),
			linked_id: Some(primary.id),
			link_precedence: LinkPrecedence::Secondary,
		}));
	}

	Consolidation { primary_id: Some(primary.id), writes, cluster_ids }
}
