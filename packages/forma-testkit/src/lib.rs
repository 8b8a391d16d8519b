mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

/// Resource manifest with `owners` and `cars`, both prioritised, seeded with a few records.
pub const GARAGE_MANIFEST: &str = include_str!("fixtures/garage.json");

/// A throwaway database created next to the one `FORMA_PG_DSN` points at. Dropping it without
/// calling [`TestDatabase::cleanup`] leaves the database behind.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin: PgConnectOptions,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn).map_err(Error::InvalidDsn)?;
		let admin = base.clone().database("postgres");
		let name = format!("forma_test_{}", Uuid::new_v4().simple());
		let admin_err = |action, source| Error::Admin { action, name: name.clone(), source };
		let mut conn =
			PgConnection::connect_with(&admin).await.map_err(|err| admin_err("connect for", err))?;

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| admin_err("create", err))?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// Ends lingering sessions and drops the database.
	pub async fn cleanup(self) -> Result<()> {
		let admin_err = |action, source| Error::Admin { action, name: self.name.clone(), source };
		let mut conn = PgConnection::connect_with(&self.admin)
			.await
			.map_err(|err| admin_err("connect for", err))?;

		sqlx::query(
			"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
		)
		.bind(self.name.as_str())
		.fetch_all(&mut conn)
		.await
		.map_err(|err| admin_err("disconnect", err))?;
		conn.execute(format!(r#"DROP DATABASE IF EXISTS "{}""#, self.name).as_str())
			.await
			.map_err(|err| admin_err("drop", err))?;

		Ok(())
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("FORMA_PG_DSN").ok()
}
