use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use kin_domain::{
	consolidation::{self, Mutation},
	contact::{Contact, LinkPrecedence},
	observation::{self, Observation, RejectCode},
	view::IdentityView,
};

use crate::{ContactTx, ContactUpdate, Error, KinService, Result, resolver};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
	#[serde(default)]
	pub email: Option<String>,
	/// Accepts either a JSON string or a JSON number.
	#[serde(default, deserialize_with = "deserialize_phone_number")]
	pub phone_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
	pub contact: IdentityView,
}

struct Settled {
	view: IdentityView,
	writes: usize,
	merged: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PhoneNumberInput {
	Text(String),
	Number(u64),
}

impl KinService {
	/// Runs the whole transaction again after a serialization failure or deadlock, up to
	/// `identity.max_attempts` runs in total.
	pub async fn identify(&self, req: IdentifyRequest) -> Result<IdentifyResponse> {
		let observation = Observation::new(req.email.as_deref(), req.phone_number.as_deref());

		if let Err(code) = observation::validate(&observation, &self.cfg.identity) {
			return Err(Error::InvalidRequest { message: reject_message(code).to_string() });
		}

		let max_attempts = self.cfg.identity.max_attempts.max(1);
		let mut attempt = 1;

		loop {
			match self.identify_once(&observation).await {
				Err(Error::Conflict { message }) if attempt < max_attempts => {
					tracing::debug!(
						attempt,
						error = %message,
						"Identify transaction conflicted. Retrying."
					);

					attempt += 1;
				},
				result => return result,
			}
		}
	}

	async fn identify_once(&self, observation: &Observation) -> Result<IdentifyResponse> {
		let mut tx = self.store.begin().await?;
		let result = settle(tx.as_mut(), observation, self.cfg.identity.lock_observations).await;

		match result {
			Ok(settled) => {
				tx.commit().await?;

				tracing::info!(
					primary_contact_id = settled.view.primary_contact_id,
					writes = settled.writes,
					merged = settled.merged,
					"Identity resolved."
				);

				Ok(IdentifyResponse { contact: settled.view })
			},
			Err(err) => {
				if let Err(rollback_err) = tx.rollback().await {
					tracing::warn!(error = %rollback_err, "Failed to roll back identify transaction.");
				}

				Err(err)
			},
		}
	}
}

/// Resolves, consolidates, and writes one observation inside `tx`. Nothing is committed here.
async fn settle(
	tx: &mut dyn ContactTx,
	observation: &Observation,
	lock_observations: bool,
) -> Result<Settled> {
	let mut members: Vec<Contact> = if lock_observations {
		tx.lock_keys(&observation.lock_keys()).await?;

		let members = resolver::resolve(tx, observation).await?;

		lock_cluster(tx, observation, members).await?
	} else {
		resolver::resolve(tx, observation).await?
	};
	let plan = consolidation::consolidate(&members, observation);
	let now = OffsetDateTime::now_utc();
	let mut primary_id = plan.primary_id;

	for write in &plan.writes {
		match write {
			Mutation::Promote(id) => {
				let update =
					ContactUpdate { link_precedence: LinkPrecedence::Primary, linked_id: None };

				tx.update(*id, update).await?;

				if let Some(member) = members.iter_mut().find(|member| member.id == *id) {
					member.promote(now);
				}
			},
			Mutation::Link(link) => {
				let update = ContactUpdate {
					link_precedence: LinkPrecedence::Secondary,
					linked_id: Some(link.primary_id),
				};

				tx.update(link.id, update).await?;

				if let Some(member) = members.iter_mut().find(|member| member.id == link.id) {
					member.link_to(link.primary_id, now);
				}
			},
			Mutation::Create(new_contact) => {
				let created = tx.insert(new_contact).await?;

				primary_id.get_or_insert(created.id);
				members.push(created);
			},
		}
	}

	let primary_id = primary_id.ok_or_else(|| Error::Storage {
		message: "Consolidation finished without a primary contact.".to_string(),
	})?;

	if plan.is_noop() {
		tracing::debug!(primary_contact_id = primary_id, "Observation carried no new information.");
	}

	Ok(Settled {
		view: IdentityView::from_cluster(primary_id, &members),
		writes: plan.writes.len(),
		merged: plan.merged(),
	})
}

/// Locks the primaries `members` hangs off, then resolves again until a pass turns up no primary
/// that is not locked yet. Another transaction may have merged the cluster while we waited.
async fn lock_cluster(
	tx: &mut dyn ContactTx,
	observation: &Observation,
	mut members: Vec<Contact>,
) -> Result<Vec<Contact>> {
	let mut held = BTreeSet::new();

	loop {
		let keys = consolidation::cluster_lock_keys(&members)
			.into_iter()
			.filter(|key| !held.contains(key))
			.collect::<Vec<_>>();

		if keys.is_empty() {
			return Ok(members);
		}

		tx.lock_keys(&keys).await?;
		held.extend(keys);

		members = resolver::resolve(tx, observation).await?;
	}
}

fn reject_message(code: RejectCode) -> &'static str {
	match code {
		RejectCode::RejectEmpty => "At least one of email or phoneNumber is required.",
		RejectCode::RejectEmailTooLong => "email exceeds the configured maximum length.",
		RejectCode::RejectPhoneTooLong => "phoneNumber exceeds the configured maximum length.",
	}
}

fn deserialize_phone_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Option::<PhoneNumberInput>::deserialize(deserializer)?;

	Ok(value.map(|value| match value {
		PhoneNumberInput::Text(text) => text,
		PhoneNumberInput::Number(number) => number.to_string(),
	}))
}
