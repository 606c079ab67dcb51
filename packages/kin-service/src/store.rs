use sqlx::{Postgres, Transaction};

use kin_domain::{
	consolidation::NewContact,
	contact::{Contact, LinkPrecedence},
};
use kin_storage::{
	contacts,
	db::{Db, IsolationLevel},
	models::{ContactRow, NewContactRow},
};

use crate::{BoxFuture, ContactStore, ContactTx, ContactUpdate, Error, Result};

/// [`ContactStore`] backed by the Postgres `contacts` table.
pub struct PgContactStore {
	db: Db,
	isolation: IsolationLevel,
}
impl PgContactStore {
	pub fn new(db: Db, isolation: IsolationLevel) -> Self {
		Self { db, isolation }
	}
}
impl ContactStore for PgContactStore {
	fn begin(&self) -> BoxFuture<'_, Result<Box<dyn ContactTx>>> {
		Box::pin(async move {
			let tx = self.db.begin(self.isolation).await?;

			Ok(Box::new(PgContactTx { tx }) as Box<dyn ContactTx>)
		})
	}
}

pub struct PgContactTx {
	tx: Transaction<'static, Postgres>,
}
impl ContactTx for PgContactTx {
	fn lock_keys<'a>(&'a mut self, keys: &'a [String]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			for key in keys {
				contacts::lock_key(&mut self.tx, key).await?;
			}

			Ok(())
		})
	}

	fn find_matching<'a>(
		&'a mut self,
		email: Option<&'a str>,
		phone_number: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<Contact>>> {
		Box::pin(async move {
			let rows = contacts::find_matching(&mut self.tx, email, phone_number).await?;

			rows.into_iter().map(contact_from_row).collect::<Result<Vec<_>>>()
		})
	}

	fn find_closure<'a>(&'a mut self, seed_ids: &'a [i64]) -> BoxFuture<'a, Result<Vec<Contact>>> {
		Box::pin(async move {
			let rows = contacts::find_closure(&mut self.tx, seed_ids).await?;

			rows.into_iter().map(contact_from_row).collect::<Result<Vec<_>>>()
		})
	}

	fn insert<'a>(&'a mut self, contact: &'a NewContact) -> BoxFuture<'a, Result<Contact>> {
		Box::pin(async move {
			let row = NewContactRow {
				email: contact.email.as_deref(),
				phone_number: contact.phone_number.as_deref(),
				linked_id: contact.linked_id,
				link_precedence: contact.link_precedence.as_str(),
			};
			let inserted = contacts::insert_contact(&mut self.tx, &row).await?;

			contact_from_row(inserted)
		})
	}

	fn update<'a>(&'a mut self, id: i64, update: ContactUpdate) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			contacts::update_contact_link(
				&mut self.tx,
				id,
				update.link_precedence.as_str(),
				update.linked_id,
			)
			.await?;

			Ok(())
		})
	}

	fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.tx.commit().await.map_err(Error::from_tx_end)
		})
	}

	fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.tx.rollback().await.map_err(Error::from_tx_end)
		})
	}
}

fn contact_from_row(row: ContactRow) -> Result<Contact> {
	let link_precedence = LinkPrecedence::parse(&row.link_precedence).ok_or_else(|| {
		Error::Storage {
			message: format!(
				"Contact {} has unknown link_precedence {:?}.",
				row.id, row.link_precedence
			),
		}
	})?;

	Ok(Contact {
		id: row.id,
		email: row.email,
		phone_number: row.phone_number,
		linked_id: row.linked_id,
		link_precedence,
		created_at: row.created_at,
		updated_at: row.updated_at,
		deleted_at: row.deleted_at,
	})
}
