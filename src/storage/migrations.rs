use anyhow::{bail, Context, Result};
use rusqlite::Connection;

const KV_SCHEMA_VERSION: i32 = 1;

/// Creates the `kv_store` table on a fresh file and stamps `user_version`.
/// A file written by a newer build is refused rather than guessed at.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    match version {
        KV_SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn
                .transaction()
                .context("failed to open kv schema transaction")?;
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))
                .context("failed to create kv_store table")?;
            tx.pragma_update(None, "user_version", KV_SCHEMA_VERSION)
                .context("failed to stamp user_version")?;
            tx.commit().context("failed to commit kv schema")
        }
        newer => bail!("kv store version {newer} is newer than supported ({KV_SCHEMA_VERSION})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_version(conn: &Connection) -> i32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn fresh_database_gets_kv_table_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(user_version(&conn), KV_SCHEMA_VERSION);

        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('k', 'v', 'now')",
            [],
        )
        .unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", KV_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
