use kin_config::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
	RejectEmpty,
	RejectEmailTooLong,
	RejectPhoneTooLong,
}

/// A single (email, phone number) sighting with blank values already folded to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
	pub email: Option<String>,
	pub phone_number: Option<String>,
}
impl Observation {
	pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
		Self { email: clean(email), phone_number: clean(phone_number) }
	}

	pub fn is_empty(&self) -> bool {
		self.email.is_none() && self.phone_number.is_none()
	}

	/// Advisory lock keys for this observation, sorted so concurrent callers acquire them in the
	/// same order.
	pub fn lock_keys(&self) -> Vec<String> {
		let mut keys = Vec::with_capacity(2);

		if let Some(email) = self.email.as_deref() {
			keys.push(format!("email:{email}"));
		}
		if let Some(phone_number) = self.phone_number.as_deref() {
			keys.push(format!("phone:{phone_number}"));
		}

		keys.sort();

		keys
	}
}

pub fn validate(observation: &Observation, cfg: &Identity) -> Result<(), RejectCode> {
	if observation.is_empty() {
		return Err(RejectCode::RejectEmpty);
	}

	if let Some(email) = observation.email.as_deref()
		&& email.chars().count() as u32 > cfg.max_email_chars
	{
		return Err(RejectCode::RejectEmailTooLong);
	}
	if let Some(phone_number) = observation.phone_number.as_deref()
		&& phone_number.chars().count() as u32 > cfg.max_phone_chars
	{
		return Err(RejectCode::RejectPhoneTooLong);
	}

	Ok(())
}

fn clean(value: Option<&str>) -> Option<String> {
	value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
