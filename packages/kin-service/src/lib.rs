pub mod identify;
pub mod resolver;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use identify::{IdentifyRequest, IdentifyResponse};
pub use kin_domain::view::IdentityView;

use std::{future::Future, pin::Pin, sync::Arc};

use kin_config::Config;
use kin_domain::{
	consolidation::NewContact,
	contact::{Contact, LinkPrecedence},
};
use kin_storage::db::{Db, IsolationLevel};

use crate::store::PgContactStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Partial update of a contact's link fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactUpdate {
	pub link_precedence: LinkPrecedence,
	pub linked_id: Option<i64>,
}

/// Entry point into the contact table. Each identify call works inside one handle from `begin`.
pub trait ContactStore
where
	Self: Send + Sync,
{
	fn begin(&self) -> BoxFuture<'_, Result<Box<dyn ContactTx>>>;
}

/// An open transaction over the contact table. Dropping it without `commit` rolls back.
pub trait ContactTx
where
	Self: Send,
{
	/// Serializes concurrent transactions that share any of `keys` until this one ends.
	fn lock_keys<'a>(&'a mut self, keys: &'a [String]) -> BoxFuture<'a, Result<()>>;

	fn find_matching<'a>(
		&'a mut self,
		email: Option<&'a str>,
		phone_number: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<Contact>>>;

	fn find_closure<'a>(&'a mut self, seed_ids: &'a [i64]) -> BoxFuture<'a, Result<Vec<Contact>>>;

	fn insert<'a>(&'a mut self, contact: &'a NewContact) -> BoxFuture<'a, Result<Contact>>;

	/// Fails with [`Error::NotFound`] when no live contact has `id`.
	fn update<'a>(&'a mut self, id: i64, update: ContactUpdate) -> BoxFuture<'a, Result<()>>;

	fn commit(self: Box<Self>) -> BoxFuture<'static, Result<()>>;

	fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

pub struct KinService {
	pub cfg: Config,
	pub store: Arc<dyn ContactStore>,
}
impl KinService {
	pub fn new(cfg: Config, db: Db) -> Result<Self> {
		let isolation = IsolationLevel::parse(&cfg.storage.postgres.isolation)?;
		let store = Arc::new(PgContactStore::new(db, isolation));

		Ok(Self { cfg, store })
	}

	pub fn with_store(cfg: Config, store: Arc<dyn ContactStore>) -> Self {
		Self { cfg, store }
	}
}
