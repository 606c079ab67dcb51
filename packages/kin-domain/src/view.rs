use serde::{Deserialize, Serialize};

use crate::contact::Contact;

/// Normalized view of one resolved cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
	pub primary_contact_id: i64,
	pub emails: Vec<String>,
	pub phone_numbers: Vec<String>,
	pub secondary_contact_ids: Vec<i64>,
}
impl IdentityView {
	/// Builds the view from the settled cluster. The primary's values come first, then the other
	/// members' values in election order, without duplicates.
	pub fn from_cluster(primary_id: i64, members: &[Contact]) -> Self {
		let mut ordered = members.iter().collect::<Vec<_>>();

		ordered.sort_by_key(|contact| (contact.id != primary_id, contact.election_key()));
		ordered.dedup_by_key(|contact| contact.id);

		let mut emails = Vec::new();
		let mut phone_numbers = Vec::new();

		for contact in &ordered {
			push_distinct(&mut emails, contact.email.as_deref());
			push_distinct(&mut phone_numbers, contact.phone_number.as_deref());
		}

		let mut secondary_contact_ids = ordered
			.iter()
			.map(|contact| contact.id)
			.filter(|id| *id != primary_id)
			.collect::<Vec<_>>();

		secondary_contact_ids.sort_unstable();

		Self { primary_contact_id: primary_id, emails, phone_numbers, secondary_contact_ids }
	}
}

fn push_distinct(values: &mut Vec<String>, value: Option<&str>) {
	if let Some(value) = value
		&& !values.iter().any(|existing| existing == value)
	{
		values.push(value.to_string());
	}
}
