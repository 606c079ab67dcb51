pub type Result<T, E = Error> = std::result::Result<T, E>;

/// SQLSTATEs after which rerunning the whole transaction can succeed.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Transaction error: {message}")]
	Transaction { message: String },
	/// Serialization failure or deadlock; the transaction was rolled back by the database.
	#[error("Conflict: {message}")]
	Conflict { message: String },
}
impl Error {
	/// Conversion for commit and rollback failures. Conflicts stay retryable; anything else is a
	/// [`Error::Transaction`].
	pub fn from_tx_end(err: sqlx::Error) -> Self {
		match Self::from(err) {
			Self::Storage { message } => Self::Transaction { message },
			other => other,
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		let retryable = err
			.as_database_error()
			.and_then(|db_err| db_err.code())
			.is_some_and(|code| RETRYABLE_SQLSTATES.iter().any(|retryable| *retryable == code));

		if retryable {
			Self::Conflict { message: err.to_string() }
		} else {
			Self::Storage { message: err.to_string() }
		}
	}
}

impl From<kin_storage::Error> for Error {
	fn from(err: kin_storage::Error) -> Self {
		match err {
			kin_storage::Error::Sqlx(inner) => Self::from(inner),
			kin_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			kin_storage::Error::NotFound(message) => Self::NotFound { message },
		}
	}
}
