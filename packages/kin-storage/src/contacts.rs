//! Queries over the `contacts` table.
//!
//! Every function takes a bare connection so callers can run it against a pooled connection or
//! inside an open transaction. Soft-deleted rows are never returned.

use std::collections::{BTreeMap, HashSet};

use sqlx::PgConnection;

use crate::{
	Error, Result,
	models::{ContactRow, NewContactRow},
};

const CONTACT_COLUMNS: &str = "\
	id,
	email,
	phone_number,
	linked_id,
	link_precedence,
	created_at,
	updated_at,
	deleted_at";

/// Contacts whose email or phone number equals the given value, oldest first.
pub async fn find_matching(
	executor: &mut PgConnection,
	email: Option<&str>,
	phone_number: Option<&str>,
) -> Result<Vec<ContactRow>> {
	if email.is_none() && phone_number.is_none() {
		return Ok(vec![]);
	}

	let sql = format!(
		"\
SELECT
{CONTACT_COLUMNS}
FROM contacts
WHERE deleted_at IS NULL
	AND (email = $1 OR phone_number = $2)
ORDER BY created_at, id"
	);
	let rows = sqlx::query_as::<_, ContactRow>(&sql)
		.bind(email)
		.bind(phone_number)
		.fetch_all(&mut *executor)
		.await?;

	Ok(rows)
}

/// Every contact connected to `seed_ids` through `id`/`linked_id` edges in either direction.
///
/// Expands one frontier per round trip until no unseen id remains. Links that point at a
/// soft-deleted row are still followed; the deleted row itself is left out of the result.
pub async fn find_closure(
	executor: &mut PgConnection,
	seed_ids: &[i64],
) -> Result<Vec<ContactRow>> {
	let sql = format!(
		"\
SELECT
{CONTACT_COLUMNS}
FROM contacts
WHERE deleted_at IS NULL
	AND (id = ANY($1::bigint[]) OR linked_id = ANY($1::bigint[]))"
	);
	let mut expanded = HashSet::new();
	let mut found = BTreeMap::new();
	let mut frontier =
		seed_ids.iter().copied().filter(|id| expanded.insert(*id)).collect::<Vec<_>>();

	while !frontier.is_empty() {
		let rows = sqlx::query_as::<_, ContactRow>(&sql)
			.bind(&frontier)
			.fetch_all(&mut *executor)
			.await?;
		let mut next = Vec::new();

		for row in rows {
			for id in [Some(row.id), row.linked_id].into_iter().flatten() {
				if expanded.insert(id) {
					next.push(id);
				}
			}

			found.entry(row.id).or_insert(row);
		}

		frontier = next;
	}

	Ok(found.into_values().collect())
}

pub async fn insert_contact(
	executor: &mut PgConnection,
	contact: &NewContactRow<'_>,
) -> Result<ContactRow> {
	let sql = format!(
		"\
INSERT INTO contacts (email, phone_number, linked_id, link_precedence)
VALUES ($1, $2, $3, $4)
RETURNING
{CONTACT_COLUMNS}"
	);
	let row = sqlx::query_as::<_, ContactRow>(&sql)
		.bind(contact.email)
		.bind(contact.phone_number)
		.bind(contact.linked_id)
		.bind(contact.link_precedence)
		.fetch_one(&mut *executor)
		.await?;

	Ok(row)
}

/// Rewrites the link fields of a live contact and refreshes `updated_at`.
pub async fn update_contact_link(
	executor: &mut PgConnection,
	id: i64,
	link_precedence: &str,
	linked_id: Option<i64>,
) -> Result<()> {
	let link_precedence = link_precedence.trim();

	if link_precedence.is_empty() {
		return Err(Error::InvalidArgument("contact link_precedence must not be empty".to_string()));
	}
	if linked_id == Some(id) {
		return Err(Error::InvalidArgument(format!("contact cannot link to itself; id={id}")));
	}

	let result = sqlx::query(
		"\
UPDATE contacts
SET
	link_precedence = $2,
	linked_id = $3,
	updated_at = now()
WHERE id = $1
	AND deleted_at IS NULL",
	)
	.bind(id)
	.bind(link_precedence)
	.bind(linked_id)
	.execute(&mut *executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("contact not found; id={id}")));
	}

	Ok(())
}

/// Takes a transaction-scoped advisory lock derived from `key`. Only meaningful inside a
/// transaction; the lock is released on commit or rollback.
pub async fn lock_key(executor: &mut PgConnection, key: &str) -> Result<()> {
	sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
		.bind(key)
		.execute(&mut *executor)
		.await?;

	Ok(())
}
