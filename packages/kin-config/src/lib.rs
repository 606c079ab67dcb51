mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Identity, Postgres, Security, Service, Storage};

use std::{fs, path::Path};

/// Isolation levels an identify transaction may run under.
///
/// Repeatable read is left out: its snapshot is taken by the first statement, which is the
/// advisory lock itself, so a waiter would resolve against data from before the lock was granted.
pub const ISOLATION_LEVELS: [&str; 2] = ["read_committed", "serializable"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if !ISOLATION_LEVELS.contains(&cfg.storage.postgres.isolation.as_str()) {
		return Err(Error::Validation {
			message: "storage.postgres.isolation must be one of read_committed or serializable."
				.to_string(),
		});
	}
	if !cfg.identity.lock_observations && cfg.storage.postgres.isolation != "serializable" {
		return Err(Error::Validation {
			message: "identity.lock_observations may only be disabled when storage.postgres.isolation is serializable."
				.to_string(),
		});
	}
	if cfg.identity.max_email_chars == 0 {
		return Err(Error::Validation {
			message: "identity.max_email_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.identity.max_phone_chars == 0 {
		return Err(Error::Validation {
			message: "identity.max_phone_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.identity.max_attempts == 0 {
		return Err(Error::Validation {
			message: "identity.max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let isolation = cfg.storage.postgres.isolation.trim().to_ascii_lowercase();

	cfg.storage.postgres.isolation = isolation;

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
