use std::sync::Arc;

use kin_config::{Config, Identity, Postgres, Security, Service, Storage};
use kin_service::{IdentifyRequest, IdentityView, KinService};
use kin_storage::db::Db;
use kin_testkit::{ContactFixture, TestDatabase};
use time::macros::datetime;

fn test_config(dsn: String, isolation: &str, lock_observations: bool) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 8, isolation: isolation.to_string() },
		},
		identity: Identity { lock_observations, max_attempts: 16, ..Identity::default() },
		security: Security { bind_localhost_only: true },
	}
}

/// Every (isolation, lock_observations) pair config validation accepts.
const CONCURRENCY_MODES: [(&str, bool); 3] =
	[("read_committed", true), ("serializable", true), ("serializable", false)];

async fn test_service(test_db: &TestDatabase) -> KinService {
	service_with_mode(test_db, "read_committed", true).await
}

async fn service_with_mode(
	test_db: &TestDatabase,
	isolation: &str,
	lock_observations: bool,
) -> KinService {
	let cfg = test_config(test_db.dsn().to_string(), isolation, lock_observations);

	kin_config::validate(&cfg).expect("Concurrency mode must pass config validation.");

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	KinService::new(cfg, db).expect("Failed to build service.")
}

fn request(email: &str, phone_number: &str) -> IdentifyRequest {
	IdentifyRequest {
		email: Some(email.to_string()),
		phone_number: Some(phone_number.to_string()),
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set KIN_PG_DSN to run."]
async fn scenarios_resolve_against_postgres() {
	let Some(base_dsn) = kin_testkit::env_dsn() else {
		eprintln!("Skipping scenarios_resolve_against_postgres; set KIN_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let service = test_service(&test_db).await;
	let first = service.identify(request("a@x.com", "111")).await.expect("identify failed");

	assert_eq!(
		first.contact,
		IdentityView {
			primary_contact_id: 1,
			emails: vec!["a@x.com".to_string()],
			phone_numbers: vec!["111".to_string()],
			secondary_contact_ids: vec![],
		}
	);

	let second = service.identify(request("a@x.com", "222")).await.expect("identify failed");

	assert_eq!(second.contact.phone_numbers, vec!["111", "222"]);
	assert_eq!(second.contact.secondary_contact_ids, vec![2]);

	let repeat = service.identify(request("a@x.com", "111")).await.expect("identify failed");

	assert_eq!(repeat, second);

	service.identify(request("b@x.com", "333")).await.expect("identify failed");
	service.identify(request("c@x.com", "444")).await.expect("identify failed");

	let merged = service.identify(request("b@x.com", "444")).await.expect("identify failed");

	assert_eq!(
		merged.contact,
		IdentityView {
			primary_contact_id: 3,
			emails: vec!["b@x.com".to_string(), "c@x.com".to_string()],
			phone_numbers: vec!["333".to_string(), "444".to_string()],
			secondary_contact_ids: vec![4],
		}
	);

	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM contacts")
		.fetch_one(&test_db_pool(&test_db).await)
		.await
		.expect("Failed to count contacts.");

	assert_eq!(count, 4);

	drop(service);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires external Postgres. Set KIN_PG_DSN to run."]
async fn concurrent_first_sightings_elect_one_primary() {
	let Some(base_dsn) = kin_testkit::env_dsn() else {
		eprintln!("Skipping concurrent_first_sightings_elect_one_primary; set KIN_PG_DSN to run.");

		return;
	};

	for (isolation, lock_observations) in CONCURRENCY_MODES {
		let test_db =
			TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
		let service = Arc::new(service_with_mode(&test_db, isolation, lock_observations).await);
		let mut handles = Vec::new();

		for _ in 0..16 {
			let service = service.clone();

			handles.push(tokio::spawn(async move {
				service.identify(request("race@x.com", "777")).await
			}));
		}

		let mut primaries = Vec::new();

		for handle in handles {
			let response = handle
				.await
				.expect("identify task panicked")
				.unwrap_or_else(|err| panic!("identify failed under {isolation}: {err}"));

			primaries.push(response.contact.primary_contact_id);
		}

		primaries.dedup();

		assert_eq!(primaries.len(), 1, "isolation={isolation} locks={lock_observations}");

		let pool = test_db_pool(&test_db).await;
		let rows: i64 = sqlx::query_scalar("SELECT count(*) FROM contacts")
			.fetch_one(&pool)
			.await
			.expect("Failed to count contacts.");

		assert_eq!(rows, 1, "isolation={isolation} locks={lock_observations}");

		pool.close().await;
		drop(service);
		test_db.cleanup().await.expect("Failed to cleanup test database.");
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires external Postgres. Set KIN_PG_DSN to run."]
async fn merge_racing_new_fragments_keeps_links_flat() {
	let Some(base_dsn) = kin_testkit::env_dsn() else {
		eprintln!("Skipping merge_racing_new_fragments_keeps_links_flat; set KIN_PG_DSN to run.");

		return;
	};

	for (isolation, lock_observations) in CONCURRENCY_MODES {
		let test_db =
			TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
		let service = Arc::new(service_with_mode(&test_db, isolation, lock_observations).await);
		let pool = test_db_pool(&test_db).await;

		for round in 0..20 {
			let old_email = format!("old{round}@x.com");
			let young_email = format!("young{round}@x.com");
			let old = service
				.identify(request(&old_email, &format!("1{round:03}")))
				.await
				.expect("identify failed");
			let young_phone = format!("2{round:03}");

			service.identify(request(&young_email, &young_phone)).await.expect("identify failed");

			let mut handles = Vec::new();

			{
				let service = service.clone();
				let old_email = old_email.clone();

				handles.push(tokio::spawn(async move {
					service.identify(request(&old_email, &young_phone)).await
				}));
			}

			for fragment in 0..6 {
				let service = service.clone();
				let young_email = young_email.clone();

				handles.push(tokio::spawn(async move {
					service.identify(request(&young_email, &format!("3{round:03}{fragment}"))).await
				}));
			}

			for handle in handles {
				handle.await.expect("identify task panicked").expect("identify failed");
			}

			let links: Vec<(String, Option<i64>)> = sqlx::query_as(
				"\
SELECT link_precedence, linked_id
FROM contacts
WHERE email = $1 OR email = $2",
			)
			.bind(&old_email)
			.bind(&young_email)
			.fetch_all(&pool)
			.await
			.expect("Failed to read cluster links.");

			assert_eq!(links.len(), 8, "round={round} isolation={isolation}");

			for (link_precedence, linked_id) in links {
				match link_precedence.as_str() {
					"primary" => assert_eq!(linked_id, None),
					_ => assert_eq!(
						linked_id,
						Some(old.contact.primary_contact_id),
						"round={round} isolation={isolation} locks={lock_observations}"
					),
				}
			}
		}

		let chained: i64 = sqlx::query_scalar(
			"\
SELECT count(*)
FROM contacts c
JOIN contacts p ON p.id = c.linked_id
WHERE p.link_precedence <> 'primary'",
		)
		.fetch_one(&pool)
		.await
		.expect("Failed to count chained links.");

		assert_eq!(chained, 0);

		pool.close().await;
		drop(service);
		test_db.cleanup().await.expect("Failed to cleanup test database.");
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set KIN_PG_DSN to run."]
async fn election_uses_created_at_then_id_and_promotes_orphans() {
	let Some(test_db) = TestDatabase::from_env().await.expect("Failed to create test database.")
	else {
		eprintln!("Skipping election_uses_created_at_then_id_and_promotes_orphans; set KIN_PG_DSN.");

		return;
	};
	let service = test_service(&test_db).await;
	let pool = test_db_pool(&test_db).await;
	let mut conn = pool.acquire().await.expect("Failed to acquire connection.");
	let noon = datetime!(2023-04-01 12:00 UTC);
	// Inserted first but created later, so it must lose the election.
	let late = kin_testkit::seed_contact(
		&mut conn,
		&ContactFixture::primary(Some("late@x.com"), Some("900"), noon + time::Duration::hours(1)),
	)
	.await
	.expect("Failed to seed contact.");
	let early = kin_testkit::seed_contact(
		&mut conn,
		&ContactFixture::primary(Some("early@x.com"), Some("901"), noon),
	)
	.await
	.expect("Failed to seed contact.");
	let merged =
		service.identify(request("late@x.com", "901")).await.expect("identify failed");

	assert_eq!(merged.contact.primary_contact_id, early);
	assert_eq!(merged.contact.emails, vec!["early@x.com", "late@x.com"]);
	assert_eq!(merged.contact.secondary_contact_ids, vec![late]);

	let gone = kin_testkit::seed_contact(
		&mut conn,
		&ContactFixture::primary(Some("gone@x.com"), None, noon - time::Duration::days(1)),
	)
	.await
	.expect("Failed to seed contact.");
	let first = kin_testkit::seed_contact(
		&mut conn,
		&ContactFixture::primary(Some("orphan@x.com"), Some("500"), noon).secondary_of(gone),
	)
	.await
	.expect("Failed to seed contact.");
	let second = kin_testkit::seed_contact(
		&mut conn,
		&ContactFixture::primary(Some("orphan@x.com"), Some("501"), noon).secondary_of(gone),
	)
	.await
	.expect("Failed to seed contact.");

	kin_testkit::soft_delete(&mut conn, gone).await.expect("Failed to soft delete contact.");

	let regrouped = service
		.identify(IdentifyRequest { email: Some("orphan@x.com".to_string()), phone_number: None })
		.await
		.expect("identify failed");

	assert_eq!(
		regrouped.contact,
		IdentityView {
			primary_contact_id: first,
			emails: vec!["orphan@x.com".to_string()],
			phone_numbers: vec!["500".to_string(), "501".to_string()],
			secondary_contact_ids: vec![second],
		}
	);

	let precedence: String =
		sqlx::query_scalar("SELECT link_precedence FROM contacts WHERE id = $1")
			.bind(first)
			.fetch_one(&mut *conn)
			.await
			.expect("Failed to read promoted contact.");

	assert_eq!(precedence, "primary");

	drop(conn);
	pool.close().await;
	drop(service);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

async fn test_db_pool(test_db: &TestDatabase) -> sqlx::PgPool {
	sqlx::PgPool::connect(test_db.dsn()).await.expect("Failed to connect to test database.")
}
