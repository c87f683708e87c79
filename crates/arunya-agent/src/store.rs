// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable record storage with a transactional primary and a plain-file
//! fallback.
//!
//! The primary backend is a versioned SQLite database (asynchronous open,
//! transactions, `PRAGMA user_version` schema upgrades). When it cannot be
//! opened or an operation on it fails, the same operation is retried against
//! a synchronous JSON file store. Callers cannot observe which backend
//! served them; only a failure of the fallback surfaces.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::warn;

use crate::error::Result;

/// Store holding archived session ids, oldest first.
pub const SESSION_HISTORY_STORE: &str = "session_history";
/// Store holding the privacy opt-out flag (last record wins).
pub const PRIVACY_STORE: &str = "privacy";

const SCHEMA_VERSION: i64 = 1;

/// Durable, append-ordered record storage.
///
/// Records within a store are kept in insertion order; `get` returns them
/// oldest first.
#[async_trait]
pub trait RecordStore: Send + Sync {
	/// All records in the named store, oldest first.
	async fn get(&self, store: &str) -> Result<Vec<Value>>;

	/// Appends a record to the named store.
	async fn put(&self, store: &str, record: Value) -> Result<()>;

	/// Deletes all but the `keep` newest records from the named store.
	async fn delete_oldest(&self, store: &str, keep: usize) -> Result<()>;
}

/// Primary backend: transactional, versioned SQLite storage.
#[derive(Debug)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	/// Opens (creating if missing) the database and runs the schema-upgrade
	/// hook.
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let options = SqliteConnectOptions::new()
			.filename(path.as_ref())
			.create_if_missing(true);
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect_with(options)
			.await?;
		Self::upgrade_schema(&pool).await?;
		Ok(Self { pool })
	}

	async fn upgrade_schema(pool: &SqlitePool) -> Result<()> {
		let version: i64 = sqlx::query_scalar("PRAGMA user_version")
			.fetch_one(pool)
			.await?;
		if version < SCHEMA_VERSION {
			let mut tx = pool.begin().await?;
			sqlx::query(
				"CREATE TABLE IF NOT EXISTS records (
					id INTEGER PRIMARY KEY AUTOINCREMENT,
					store TEXT NOT NULL,
					body TEXT NOT NULL
				)",
			)
			.execute(&mut *tx)
			.await?;
			sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_store ON records (store, id)")
				.execute(&mut *tx)
				.await?;
			sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
				.execute(&mut *tx)
				.await?;
			tx.commit().await?;
		}
		Ok(())
	}
}

#[async_trait]
impl RecordStore for SqliteStore {
	async fn get(&self, store: &str) -> Result<Vec<Value>> {
		let rows = sqlx::query("SELECT body FROM records WHERE store = ?1 ORDER BY id ASC")
			.bind(store)
			.fetch_all(&self.pool)
			.await?;
		let mut records = Vec::with_capacity(rows.len());
		for row in rows {
			let body: String = row.try_get("body")?;
			match serde_json::from_str(&body) {
				Ok(value) => records.push(value),
				Err(e) => warn!(store = %store, error = %e, "skipping unparseable record"),
			}
		}
		Ok(records)
	}

	async fn put(&self, store: &str, record: Value) -> Result<()> {
		let body = serde_json::to_string(&record)?;
		sqlx::query("INSERT INTO records (store, body) VALUES (?1, ?2)")
			.bind(store)
			.bind(body)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_oldest(&self, store: &str, keep: usize) -> Result<()> {
		sqlx::query(
			"DELETE FROM records
			 WHERE store = ?1
			   AND id NOT IN (
				SELECT id FROM records WHERE store = ?1 ORDER BY id DESC LIMIT ?2
			   )",
		)
		.bind(store)
		.bind(keep as i64)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

/// Fallback backend: a single JSON file mapping store name to an array of
/// records, rewritten whole on every mutation.
///
/// Reads and writes are synchronous and unversioned; concurrent
/// read-modify-write sequences race last-writer-wins. That is an accepted
/// property of the degraded mode, not of normal operation.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	fn load(&self) -> Result<Map<String, Value>> {
		if !self.path.exists() {
			return Ok(Map::new());
		}
		let raw = std::fs::read_to_string(&self.path)?;
		if raw.trim().is_empty() {
			return Ok(Map::new());
		}
		match serde_json::from_str::<Value>(&raw)? {
			Value::Object(map) => Ok(map),
			_ => Ok(Map::new()),
		}
	}

	fn save(&self, map: Map<String, Value>) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&self.path, serde_json::to_vec(&Value::Object(map))?)?;
		Ok(())
	}
}

#[async_trait]
impl RecordStore for JsonFileStore {
	async fn get(&self, store: &str) -> Result<Vec<Value>> {
		let map = self.load()?;
		Ok(match map.get(store) {
			Some(Value::Array(records)) => records.clone(),
			_ => Vec::new(),
		})
	}

	async fn put(&self, store: &str, record: Value) -> Result<()> {
		let mut map = self.load()?;
		match map.entry(store.to_string()).or_insert_with(|| Value::Array(Vec::new())) {
			Value::Array(records) => records.push(record),
			other => *other = Value::Array(vec![record]),
		}
		self.save(map)
	}

	async fn delete_oldest(&self, store: &str, keep: usize) -> Result<()> {
		let mut map = self.load()?;
		if let Some(Value::Array(records)) = map.get_mut(store) {
			if records.len() > keep {
				let excess = records.len() - keep;
				records.drain(..excess);
			}
		}
		self.save(map)
	}
}

/// Primary-then-fallback composite store.
///
/// Errors from the primary backend are logged and the operation retried
/// against the fallback; a fallback failure is the caller's error.
#[derive(Debug)]
pub struct FallbackStore {
	primary: Option<SqliteStore>,
	fallback: JsonFileStore,
}

impl FallbackStore {
	/// Opens both backends under `data_dir`. A primary that fails to open is
	/// logged and left out; the store then serves everything from the
	/// fallback.
	pub async fn open(data_dir: impl AsRef<Path>) -> Self {
		let dir = data_dir.as_ref();
		if let Err(e) = std::fs::create_dir_all(dir) {
			warn!(error = %e, "failed to create data directory");
		}
		let fallback = JsonFileStore::new(dir.join("arunya-store.json"));
		let primary = match SqliteStore::open(dir.join("arunya.db")).await {
			Ok(store) => Some(store),
			Err(e) => {
				warn!(error = %e, "primary store unavailable, using fallback only");
				None
			}
		};
		Self { primary, fallback }
	}
}

#[async_trait]
impl RecordStore for FallbackStore {
	async fn get(&self, store: &str) -> Result<Vec<Value>> {
		if let Some(primary) = &self.primary {
			match primary.get(store).await {
				Ok(records) => return Ok(records),
				Err(e) => {
					warn!(store = %store, error = %e, "primary store read failed, trying fallback");
				}
			}
		}
		self.fallback.get(store).await
	}

	async fn put(&self, store: &str, record: Value) -> Result<()> {
		if let Some(primary) = &self.primary {
			match primary.put(store, record.clone()).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					warn!(store = %store, error = %e, "primary store write failed, trying fallback");
				}
			}
		}
		self.fallback.put(store, record).await
	}

	async fn delete_oldest(&self, store: &str, keep: usize) -> Result<()> {
		if let Some(primary) = &self.primary {
			match primary.delete_oldest(store, keep).await {
				Ok(()) => return Ok(()),
				Err(e) => {
					warn!(store = %store, error = %e, "primary store prune failed, trying fallback");
				}
			}
		}
		self.fallback.delete_oldest(store, keep).await
	}
}
