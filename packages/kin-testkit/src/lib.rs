//! Disposable Postgres databases and contact fixtures for tests that need a real `contacts` table.

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use time::OffsetDateTime;
use tokio::runtime::Builder;
use uuid::Uuid;

pub const DSN_ENV: &str = "KIN_PG_DSN";

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A throwaway database created on the server named by [`DSN_ENV`] and dropped on cleanup.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse {DSN_ENV}: {err}.")))?;
		let (maintenance, mut conn) = open_maintenance(&base).await?;
		let name = format!("kin_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create {name}: {err}.")))?;
		conn.close().await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, dropped: false })
	}

	/// `None` when [`DSN_ENV`] is unset, so callers can skip instead of failing.
	pub async fn from_env() -> Result<Option<Self>> {
		match env_dsn() {
			Some(base_dsn) => Self::new(&base_dsn).await.map(Some),
			None => Ok(None),
		}
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.drop_database().await
	}

	async fn drop_database(&mut self) -> Result<()> {
		if self.dropped {
			return Ok(());
		}

		drop_database(&self.name, &self.maintenance).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		// The async runtime that owns `self` may already be shutting down, so drop from a fresh one.
		let worker = thread::spawn(move || {
			let result = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(drop_database(&name, &maintenance)));

			if let Err(err) = result {
				eprintln!("Failed to drop test database {name}: {err}.");
			}
		});
		let _ = worker.join();
	}
}

/// A contact row with every column the tests need to pin down, including `created_at` so
/// primary election is deterministic.
#[derive(Debug, Clone)]
pub struct ContactFixture {
	pub email: Option<String>,
	pub phone_number: Option<String>,
	pub linked_id: Option<i64>,
	pub created_at: OffsetDateTime,
}
impl ContactFixture {
	pub fn primary(email: Option<&str>, phone_number: Option<&str>, created_at: OffsetDateTime) -> Self {
		Self {
			email: email.map(str::to_string),
			phone_number: phone_number.map(str::to_string),
			linked_id: None,
			created_at,
		}
	}

	pub fn secondary_of(mut self, primary_id: i64) -> Self {
		self.linked_id = Some(primary_id);

		self
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok()
}

pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;

	if let Err(err) = db.drop_database().await {
		eprintln!("Test database cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

/// Inserts `fixture` into an existing `contacts` table and returns its id.
pub async fn seed_contact(conn: &mut PgConnection, fixture: &ContactFixture) -> Result<i64> {
	let link_precedence = if fixture.linked_id.is_some() { "secondary" } else { "primary" };
	let id = sqlx::query_scalar(
		"\
INSERT INTO contacts (email, phone_number, linked_id, link_precedence, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $5)
RETURNING id",
	)
	.bind(fixture.email.as_deref())
	.bind(fixture.phone_number.as_deref())
	.bind(fixture.linked_id)
	.bind(link_precedence)
	.bind(fixture.created_at)
	.fetch_one(&mut *conn)
	.await?;

	Ok(id)
}

pub async fn soft_delete(conn: &mut PgConnection, id: i64) -> Result<()> {
	let result = sqlx::query("UPDATE contacts SET deleted_at = now() WHERE id = $1")
		.bind(id)
		.execute(&mut *conn)
		.await?;

	if result.rows_affected() == 0 {
		return Err(Error::Message(format!("No contact to soft delete; id={id}.")));
	}

	Ok(())
}

async fn open_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!(
		"Failed to reach a maintenance database ({}).",
		failures.join("; ")
	)))
}

async fn drop_database(name: &str, maintenance: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(maintenance).await?;

	// Pools held by the test may still be open.
	sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.await
		.map_err(|err| Error::Message(format!("Failed to drop {name}: {err}.")))?;
	conn.close().await?;

	Ok(())
}
