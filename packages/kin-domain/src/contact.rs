use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
	Primary,
	Secondary,
}
impl LinkPrecedence {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Primary => "primary",
			Self::Secondary => "secondary",
		}
	}

	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"primary" => Some(Self::Primary),
			"secondary" => Some(Self::Secondary),
			_ => None,
		}
	}
}

/// One stored fragment of a customer's contact details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
	pub id: i64,
	pub email: Option<String>,
	pub phone_number: Option<String>,
	/// Set only on secondaries and always points at the cluster primary.
	pub linked_id: Option<i64>,
	pub link_precedence: LinkPrecedence,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub deleted_at: Option<OffsetDateTime>,
}
impl Contact {
	/// Ordering key for primary election. Oldest wins, lowest id breaks ties.
	pub fn election_key(&self) -> (OffsetDateTime, i64) {
		(self.created_at, self.id)
	}

	pub fn is_primary(&self) -> bool {
		self.link_precedence == LinkPrecedence::Primary
	}

	pub fn is_linked_to(&self, primary_id: i64) -> bool {
		self.link_precedence == LinkPrecedence::Secondary && self.linked_id == Some(primary_id)
	}

	pub fn promote(&mut self, now: OffsetDateTime) {
		self.link_precedence = LinkPrecedence::Primary;
		self.linked_id = None;
		self.updated_at = now;
	}

	pub fn link_to(&mut self, primary_id: i64, now: OffsetDateTime) {
		self.link_precedence = LinkPrecedence::Secondary;
		self.linked_id = Some(primary_id);
		self.updated_at = now;
	}
}
