use std::collections::BTreeMap;

use kin_domain::{contact::Contact, observation::Observation};

use crate::{ContactTx, Result};

/// Every stored contact reachable from the observation, deduplicated and ordered by id.
///
/// Direct matches only seed the search; the closure pulls in their primary and sibling
/// secondaries even when those share neither the email nor the phone number.
pub async fn resolve(tx: &mut dyn ContactTx, observation: &Observation) -> Result<Vec<Contact>> {
	let seeds = tx
		.find_matching(observation.email.as_deref(), observation.phone_number.as_deref())
		.await?;

	if seeds.is_empty() {
		return Ok(Vec::new());
	}

	let mut seed_ids = seeds.iter().map(|contact| contact.id).collect::<Vec<_>>();

	seed_ids.sort_unstable();
	seed_ids.dedup();

	let closure = tx.find_closure(&seed_ids).await?;
	let mut by_id = BTreeMap::new();

	for contact in seeds.into_iter().chain(closure) {
		by_id.entry(contact.id).or_insert(contact);
	}

	Ok(by_id.into_values().collect())
}
