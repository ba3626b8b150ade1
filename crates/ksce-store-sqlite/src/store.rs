//! [`SqliteStore`], the SQLite implementation of [`UpstreamRegistry`].

use std::path::Path;

use ksce_core::{PublicKeyPolicy, Upstream, UpstreamRegistry};
use rusqlite::{OptionalExtension as _, params};
use tracing::{error, info};

use crate::{
  Error, Result,
  schema::{SCHEMA, TABLES},
  tx::{Resolved, find_id, find_ids, find_or_create, in_transaction},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The proxy's routing database, backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  policy:          PublicKeyPolicy,
}

/// Row counts per table, as reported by [`SqliteStore::table_counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
  pub server:            i64,
  pub upstream:          i64,
  pub user_upstream_map: i64,
  pub private_keys:      i64,
  pub public_keys:       i64,
  pub pubkey_prikey_map: i64,
}

impl TableCounts {
  pub fn total(&self) -> i64 {
    self.server
      + self.upstream
      + self.user_upstream_map
      + self.private_keys
      + self.public_keys
      + self.pubkey_prikey_map
  }
}

/// Row ids an unregister will remove, resolved before anything is deleted.
///
/// The routing rows and the key rows are found independently, so whatever a
/// failed register or an interrupted unregister left behind is still found.
#[derive(Debug, Default)]
struct Registration {
  user_map_ids:   Vec<i64>,
  upstream_ids:   Vec<i64>,
  server_ids:     Vec<i64>,
  key_map_ids:    Vec<i64>,
  public_key_ids: Vec<i64>,
  private_key_id: Option<i64>,
}

impl Registration {
  fn is_empty(&self) -> bool {
    self.user_map_ids.is_empty()
      && self.upstream_ids.is_empty()
      && self.server_ids.is_empty()
      && self.key_map_ids.is_empty()
      && self.public_key_ids.is_empty()
      && self.private_key_id.is_none()
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, policy: PublicKeyPolicy::default() })
  }

  pub fn with_public_key_policy(mut self, policy: PublicKeyPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Run `work` as one transactional step on the connection thread.
  async fn step<T, F>(&self, work: F) -> Result<T>
  where
    F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let value = self
      .conn
      .call(move |conn| Ok(in_transaction(conn, work)?))
      .await?;
    Ok(value)
  }

  /// Delete each row of `table` listed in `ids`, one transaction per row.
  ///
  /// Keeps going past failures and reports them together; rows already
  /// deleted are not retried.
  async fn delete_rows(&self, table: &'static str, ids: Vec<i64>) -> Result<()> {
    let mut failures = Vec::new();

    for id in ids {
      let sql = format!("DELETE FROM {table} WHERE id = ?1");
      if let Err(e) = self.step(move |tx| tx.execute(&sql, [id])).await {
        error!(table, id, error = %e, "failed to delete row");
        failures.push(format!("id {id}: {e}"));
      }
    }

    if failures.is_empty() {
      Ok(())
    } else {
      Err(Error::PartialDeletion { table, failures })
    }
  }

  /// Resolve every row an unregister will touch, without writing.
  ///
  /// Servers are matched by address and name, or by name alone when the
  /// address is unknown.
  async fn resolve_registration(&self, upstream: &Upstream) -> Result<Registration> {
    let name = upstream.name.clone();
    let address = upstream.address.clone();

    let reg = self
      .conn
      .call(move |conn| {
        let server_ids = if address.is_empty() {
          find_ids(conn, "SELECT id FROM server WHERE name = ?1 ORDER BY id", [&name])?
        } else {
          find_ids(
            conn,
            "SELECT id FROM server WHERE address = ?1 AND name = ?2",
            params![address, name],
          )?
        };

        let mut upstream_ids = Vec::new();
        for server_id in &server_ids {
          upstream_ids.extend(find_ids(
            conn,
            "SELECT id FROM upstream WHERE server_id = ?1",
            [server_id],
          )?);
        }

        let mut user_map_ids = Vec::new();
        for upstream_id in &upstream_ids {
          user_map_ids.extend(find_ids(
            conn,
            "SELECT id FROM user_upstream_map WHERE upstream_id = ?1 ORDER BY id",
            [upstream_id],
          )?);
        }

        let private_key_id =
          find_id(conn, "SELECT id FROM private_keys WHERE name = ?1", [&name])?;
        let public_key_ids = find_ids(
          conn,
          "SELECT id FROM public_keys WHERE name = ?1 ORDER BY id",
          [&name],
        )?;
        let key_map_ids = find_ids(
          conn,
          "SELECT id FROM pubkey_prikey_map
           WHERE private_key_id IN (SELECT id FROM private_keys WHERE name = ?1)
              OR pubkey_id IN (SELECT id FROM public_keys WHERE name = ?1)
           ORDER BY id",
          [&name],
        )?;

        Ok(Registration {
          user_map_ids,
          upstream_ids,
          server_ids,
          key_map_ids,
          public_key_ids,
          private_key_id,
        })
      })
      .await?;

    Ok(reg)
  }

  /// Clear every table, resetting identity counters.
  ///
  /// Foreign-key enforcement is switched off only around the tables other
  /// tables point at, and switched back on straight after. Meant for a clean
  /// slate at start-up, before a full resync.
  pub async fn truncate_all(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        for table in TABLES {
          if table.referenced {
            conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
          }
          let result = in_transaction(conn, |tx| {
            tx.execute(&format!("DELETE FROM {}", table.name), [])?;
            tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table.name])?;
            Ok(())
          });
          if table.referenced {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
          }
          result?;
        }
        Ok(())
      })
      .await?;

    info!("database truncated");
    Ok(())
  }

  /// Count the rows of every table.
  pub async fn table_counts(&self) -> Result<TableCounts> {
    let counts = self
      .conn
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<i64> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok(TableCounts {
          server:            count("server")?,
          upstream:          count("upstream")?,
          user_upstream_map: count("user_upstream_map")?,
          private_keys:      count("private_keys")?,
          public_keys:       count("public_keys")?,
          pubkey_prikey_map: count("pubkey_prikey_map")?,
        })
      })
      .await?;
    Ok(counts)
  }

  /// Name of the server registered at `address`.
  pub async fn server_name(&self, address: &str) -> Result<Option<String>> {
    let address = address.to_owned();
    let name = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT name FROM server WHERE address = ?1", [address], |r| r.get(0))
            .optional()?,
        )
      })
      .await?;
    Ok(name)
  }

  /// The stored private key for `name`.
  pub async fn private_key(&self, name: &str) -> Result<Option<String>> {
    let name = name.to_owned();
    let data = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT data FROM private_keys WHERE name = ?1", [name], |r| r.get(0))
            .optional()?,
        )
      })
      .await?;
    Ok(data)
  }

  /// The stored public keys for `name`, in insertion order.
  pub async fn public_keys(&self, name: &str) -> Result<Vec<String>> {
    let name = name.to_owned();
    let keys = self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare("SELECT data FROM public_keys WHERE name = ?1 ORDER BY id")?;
        let rows = stmt
          .query_map([name], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(keys)
  }
}

// ─── UpstreamRegistry impl ───────────────────────────────────────────────────

impl UpstreamRegistry for SqliteStore {
  type Error = Error;

  async fn register(&self, upstream: &Upstream) -> Result<()> {
    let address = upstream.require_address()?.to_owned();

    // 1. server, keyed by address
    let name = upstream.name.clone();
    let server = self
      .step(move |tx| {
        find_or_create(
          tx,
          "SELECT id FROM server WHERE address = ?1",
          params![address],
          "INSERT INTO server (name, address) VALUES (?1, ?2)",
          params![name, address],
        )
      })
      .await?;
    let server_id = server.id();

    // 2. upstream, keyed by server
    let name = upstream.name.clone();
    let username = upstream.username.clone();
    let upstream_row = self
      .step(move |tx| {
        find_or_create(
          tx,
          "SELECT id FROM upstream WHERE server_id = ?1",
          params![server_id],
          "INSERT INTO upstream (name, server_id, username) VALUES (?1, ?2, ?3)",
          params![name, server_id, username],
        )
      })
      .await?;
    let upstream_id = upstream_row.id();

    // 3. user map, keyed by upstream
    let username = upstream.username.clone();
    self
      .step(move |tx| {
        find_or_create(
          tx,
          "SELECT id FROM user_upstream_map WHERE upstream_id = ?1 LIMIT 1",
          params![upstream_id],
          "INSERT INTO user_upstream_map (upstream_id, username) VALUES (?1, ?2)",
          params![upstream_id, username],
        )
      })
      .await?;

    // 4. private key, keyed by name
    let name = upstream.name.clone();
    let data = upstream.private_key.clone();
    let private_key = self
      .step(move |tx| {
        find_or_create(
          tx,
          "SELECT id FROM private_keys WHERE name = ?1",
          params![name],
          "INSERT INTO private_keys (name, data) VALUES (?1, ?2)",
          params![name, data],
        )
      })
      .await?;
    let private_key_id = private_key.id();

    // 5. public keys, each with its join row
    let mut added = 0usize;
    for key in &upstream.public_keys {
      let name = upstream.name.clone();
      let data = key.clone();
      let policy = self.policy;
      let inserted = self
        .step(move |tx| {
          if policy == PublicKeyPolicy::SkipExisting
            && find_id(
              tx,
              "SELECT id FROM public_keys WHERE name = ?1 AND data = ?2",
              params![name, data],
            )?
            .is_some()
          {
            return Ok(false);
          }
          tx.execute(
            "INSERT INTO public_keys (name, data) VALUES (?1, ?2)",
            params![name, data],
          )?;
          let pubkey_id = tx.last_insert_rowid();
          tx.execute(
            "INSERT INTO pubkey_prikey_map (private_key_id, pubkey_id) VALUES (?1, ?2)",
            params![private_key_id, pubkey_id],
          )?;
          Ok(true)
        })
        .await?;
      if inserted {
        added += 1;
      }
    }

    info!(
      name = %upstream.name,
      username = %upstream.username,
      address = %upstream.address,
      new_server = matches!(server, Resolved::Created(_)),
      public_keys_added = added,
      "upstream registered"
    );
    Ok(())
  }

  async fn unregister(&self, upstream: &Upstream) -> Result<()> {
    let reg = self.resolve_registration(upstream).await?;
    if reg.is_empty() {
      let (table, key) = if upstream.address.is_empty() {
        ("upstream", upstream.name.clone())
      } else {
        ("server", upstream.address.clone())
      };
      return Err(Error::NotFound { table, key });
    }

    // Dependents first. Stop at the first table with failures so nothing is
    // deleted while a row still points at it; a retry resumes from there.
    self.delete_rows("user_upstream_map", reg.user_map_ids).await?;
    self.delete_rows("upstream", reg.upstream_ids).await?;
    self.delete_rows("server", reg.server_ids.clone()).await?;
    self.delete_rows("pubkey_prikey_map", reg.key_map_ids).await?;
    self.delete_rows("public_keys", reg.public_key_ids.clone()).await?;
    self
      .delete_rows("private_keys", reg.private_key_id.into_iter().collect())
      .await?;

    info!(
      name = %upstream.name,
      username = %upstream.username,
      servers_removed = reg.server_ids.len(),
      public_keys_removed = reg.public_key_ids.len(),
      "upstream unregistered"
    );
    Ok(())
  }
}
