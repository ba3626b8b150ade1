//! Transaction helpers shared by every store step.

use rusqlite::{Connection, OptionalExtension as _, Params, Transaction};

/// Run `work` inside a fresh transaction, committing on success and rolling
/// back on failure.
pub(crate) fn in_transaction<T, F>(conn: &mut Connection, work: F) -> rusqlite::Result<T>
where
  F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
{
  let tx = conn.transaction()?;
  match work(&tx) {
    Ok(value) => {
      tx.commit()?;
      Ok(value)
    }
    Err(e) => {
      if let Err(rb) = tx.rollback() {
        tracing::error!(error = %rb, "rollback failed");
      }
      Err(e)
    }
  }
}

/// Outcome of a find-or-create step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
  Found(i64),
  Created(i64),
}

impl Resolved {
  pub(crate) fn id(self) -> i64 {
    match self {
      Self::Found(id) | Self::Created(id) => id,
    }
  }
}

/// Look a row up by its natural key; insert it only if absent.
pub(crate) fn find_or_create<F, I>(
  tx:            &Transaction<'_>,
  find_sql:      &str,
  find_params:   F,
  insert_sql:    &str,
  insert_params: I,
) -> rusqlite::Result<Resolved>
where
  F: Params,
  I: Params,
{
  if let Some(id) = find_id(tx, find_sql, find_params)? {
    return Ok(Resolved::Found(id));
  }
  tx.execute(insert_sql, insert_params)?;
  Ok(Resolved::Created(tx.last_insert_rowid()))
}

/// Return the `id` column of the first matching row, if any.
pub(crate) fn find_id<P: Params>(
  conn:   &Connection,
  sql:    &str,
  params: P,
) -> rusqlite::Result<Option<i64>> {
  conn.query_row(sql, params, |row| row.get(0)).optional()
}

/// Return the `id` column of every matching row.
pub(crate) fn find_ids<P: Params>(
  conn:   &Connection,
  sql:    &str,
  params: P,
) -> rusqlite::Result<Vec<i64>> {
  let mut stmt = conn.prepare(sql)?;
  let ids = stmt
    .query_map(params, |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<i64>>>()?;
  Ok(ids)
}
