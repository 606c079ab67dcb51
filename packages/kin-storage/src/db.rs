use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};

use crate::{Error, Result, schema};

const SCHEMA_LOCK_ID: i64 = 4_310_225;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
	ReadCommitted,
	Serializable,
}
impl IsolationLevel {
	pub fn parse(value: &str) -> Result<Self> {
		match value {
			"read_committed" => Ok(Self::ReadCommitted),
			"serializable" => Ok(Self::Serializable),
			other => Err(Error::InvalidArgument(format!("unknown isolation level {other:?}"))),
		}
	}

	fn as_sql(self) -> &'static str {
		match self {
			Self::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
			Self::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
		}
	}
}

pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &kin_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let sql = schema::render_schema();
		// Advisory locks are held per connection. Use a single transaction so the lock is scoped to
		// one connection and automatically released when the transaction ends.
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)")
			.bind(SCHEMA_LOCK_ID)
			.execute(&mut *tx)
			.await?;
		sqlx::raw_sql(&sql).execute(&mut *tx).await?;

		tx.commit().await?;

		Ok(())
	}

	/// Opens a transaction whose first statement pins the isolation level.
	pub async fn begin(&self, isolation: IsolationLevel) -> Result<Transaction<'static, Postgres>> {
		let mut tx = self.pool.begin().await?;

		sqlx::query(isolation.as_sql()).execute(&mut *tx).await?;

		Ok(tx)
	}
}
