use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub identity: Identity,
	pub security: Security,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
	/// Either "read_committed" or "serializable". Applied to every identify transaction.
	#[serde(default = "default_isolation")]
	pub isolation: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Identity {
	/// Serialize concurrent observations that share an email or phone number with
	/// transaction-scoped advisory locks.
	pub lock_observations: bool,
	pub max_email_chars: u32,
	pub max_phone_chars: u32,
	/// Runs of one identify call, counting the first, before a serialization failure or deadlock
	/// is returned to the caller.
	pub max_attempts: u32,
}
impl Default for Identity {
	fn default() -> Self {
		Self { lock_observations: true, max_email_chars: 320, max_phone_chars: 32, max_attempts: 5 }
	}
}

#[derive(Debug, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
}

fn default_isolation() -> String {
	"read_committed".to_string()
}
