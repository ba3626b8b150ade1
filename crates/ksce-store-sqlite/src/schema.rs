//! SQL schema read by the SSH proxy daemon.
//!
//! Executed once at connection startup. The layout mirrors the proxy's
//! routing tables; `PRAGMA user_version` gates future migrations.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS server (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT NOT NULL,
    address TEXT NOT NULL UNIQUE
);

-- One upstream per server.
CREATE TABLE IF NOT EXISTS upstream (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT    NOT NULL,
    server_id INTEGER NOT NULL UNIQUE REFERENCES server(id),
    username  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS user_upstream_map (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    upstream_id INTEGER NOT NULL REFERENCES upstream(id),
    username    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS private_keys (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    data TEXT NOT NULL
);

-- Many rows per upstream name; data is base64 of the key's wire blob.
CREATE TABLE IF NOT EXISTS public_keys (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pubkey_prikey_map (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    private_key_id INTEGER NOT NULL REFERENCES private_keys(id),
    pubkey_id      INTEGER NOT NULL REFERENCES public_keys(id)
);

CREATE INDEX IF NOT EXISTS user_upstream_map_upstream_idx ON user_upstream_map(upstream_id);
CREATE INDEX IF NOT EXISTS public_keys_name_idx           ON public_keys(name);
CREATE INDEX IF NOT EXISTS pubkey_prikey_map_private_idx  ON pubkey_prikey_map(private_key_id);

PRAGMA user_version = 1;
";

/// A table cleared by `truncate_all`.
pub struct Table {
  pub name:       &'static str,
  /// Other tables hold foreign keys into this one.
  pub referenced: bool,
}

/// Truncation order: join tables first, then the rows they point at.
pub const TABLES: &[Table] = &[
  Table { name: "pubkey_prikey_map", referenced: false },
  Table { name: "user_upstream_map", referenced: false },
  Table { name: "private_keys",      referenced: true },
  Table { name: "public_keys",       referenced: true },
  Table { name: "server",            referenced: true },
  Table { name: "upstream",          referenced: true },
];
