use std::sync::Arc;

use kin_service::KinService;
use kin_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<KinService>,
}
impl AppState {
	pub async fn new(config: kin_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = KinService::new(config, db)?;

		Ok(Self { service: Arc::new(service) })
	}

	pub fn from_service(service: KinService) -> Self {
		Self { service: Arc::new(service) }
	}
}
