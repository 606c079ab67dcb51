use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContactRow {
	pub id: i64,
	pub email: Option<String>,
	pub phone_number: Option<String>,
	pub linked_id: Option<i64>,
	pub link_precedence: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewContactRow<'a> {
	pub email: Option<&'a str>,
	pub phone_number: Option<&'a str>,
	pub linked_id: Option<i64>,
	pub link_precedence: &'a str,
}
