use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::OperatorRecord;
use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

/// SQLite-backed operator registry. The reconciliation engine never sees
/// this type; it only consumes the snapshot from `list_all` and produces
/// the records handed to `upsert_many`.
pub struct Registry {
    connection: Connection,
}

impl Registry {
    pub fn open(path: &Path) -> Result<Self> {
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn list_all(&self) -> Result<Vec<OperatorRecord>> {
        let mut statement = self.connection.prepare(
            "
            SELECT callsign, name, category, operator_type, region, district,
                   province, department, license, resolution, expires_at,
                   cutoff_at, enabled, country, updated_at
            FROM operators
            ORDER BY callsign
            ",
        )?;

        let rows = statement.query_map([], |row| {
            Ok(OperatorRecord {
                callsign: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                operator_type: row.get(3)?,
                region: row.get(4)?,
                district: row.get(5)?,
                province: row.get(6)?,
                department: row.get(7)?,
                license: row.get(8)?,
                resolution: row.get(9)?,
                expires_at: row.get(10)?,
                cutoff_at: row.get(11)?,
                enabled: row.get(12)?,
                country: row.get(13)?,
                updated_at: row.get(14)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed to read operator row")?);
        }
        Ok(records)
    }

    pub fn upsert_many(&mut self, records: &[OperatorRecord]) -> Result<usize> {
        let tx = self.connection.transaction()?;

        {
            let mut statement = tx.prepare(
                "
                INSERT INTO operators(
                  callsign, name, category, operator_type, region, district,
                  province, department, license, resolution, expires_at,
                  cutoff_at, enabled, country, updated_at
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(callsign) DO UPDATE SET
                  name=excluded.name,
                  category=excluded.category,
                  operator_type=excluded.operator_type,
                  region=excluded.region,
                  district=excluded.district,
                  province=excluded.province,
                  department=excluded.department,
                  license=excluded.license,
                  resolution=excluded.resolution,
                  expires_at=excluded.expires_at,
                  cutoff_at=excluded.cutoff_at,
                  enabled=excluded.enabled,
                  country=excluded.country,
                  updated_at=excluded.updated_at
                ",
            )?;

            for record in records {
                statement.execute(params![
                    record.callsign,
                    record.name,
                    record.category,
                    record.operator_type,
                    record.region,
                    record.district,
                    record.province,
                    record.department,
                    record.license,
                    record.resolution,
                    record.expires_at,
                    record.cutoff_at,
                    record.enabled,
                    record.country,
                    record.updated_at,
                ])?;
            }
        }

        tx.commit()?;
        Ok(records.len())
    }

    pub fn count_all(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM operators")
    }

    pub fn count_enabled(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM operators WHERE enabled = 1")
    }

    pub fn counts_by_country(&self) -> Result<Vec<(String, i64)>> {
        let mut statement = self.connection.prepare(
            "
            SELECT country, COUNT(*) FROM operators
            GROUP BY country
            ORDER BY COUNT(*) DESC, country
            ",
        )?;

        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.context("failed to read country count")?);
        }
        Ok(counts)
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let count = self.connection.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS operators (
          callsign TEXT PRIMARY KEY,
          name TEXT NOT NULL DEFAULT '',
          category TEXT NOT NULL DEFAULT '',
          operator_type TEXT NOT NULL DEFAULT '',
          region TEXT NOT NULL DEFAULT '',
          district TEXT NOT NULL DEFAULT '',
          province TEXT NOT NULL DEFAULT '',
          department TEXT NOT NULL DEFAULT '',
          license TEXT NOT NULL DEFAULT '',
          resolution TEXT NOT NULL DEFAULT '',
          expires_at TEXT,
          cutoff_at TEXT,
          enabled INTEGER NOT NULL DEFAULT 1,
          country TEXT NOT NULL DEFAULT '',
          updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_operators_country ON operators(country);
        CREATE INDEX IF NOT EXISTS idx_operators_enabled ON operators(enabled);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample(callsign: &str) -> OperatorRecord {
        OperatorRecord {
            callsign: callsign.to_string(),
            name: "JUAN PEREZ".to_string(),
            category: "NOVICIO".to_string(),
            operator_type: String::new(),
            region: String::new(),
            district: "LIMA".to_string(),
            province: "LIMA".to_string(),
            department: "LIMA".to_string(),
            license: "L-123".to_string(),
            resolution: "RD-456".to_string(),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 5, 0, 0).unwrap()),
            cutoff_at: Some(Utc.with_ymd_and_hms(2025, 8, 13, 5, 0, 0).unwrap()),
            enabled: true,
            country: "PER".to_string(),
            updated_at: Utc.with_ymd_and_hms(2025, 8, 13, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn upsert_then_list_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(&dir.path().join("registry.sqlite")).unwrap();

        registry
            .upsert_many(&[sample("OA4BAU"), sample("OA7XYZ")])
            .unwrap();

        let records = registry.list_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].callsign, "OA4BAU");
        assert_eq!(records[0].expires_at, sample("OA4BAU").expires_at);
        assert!(records[0].enabled);
    }

    #[test]
    fn upsert_overwrites_by_callsign() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(&dir.path().join("registry.sqlite")).unwrap();

        registry.upsert_many(&[sample("OA4BAU")]).unwrap();

        let mut changed = sample("OA4BAU");
        changed.enabled = false;
        changed.name = "OTRO NOMBRE".to_string();
        registry.upsert_many(&[changed]).unwrap();

        let records = registry.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "OTRO NOMBRE");
        assert!(!records[0].enabled);
    }

    #[test]
    fn counts_reflect_enabled_state_and_country() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(&dir.path().join("registry.sqlite")).unwrap();

        let mut disabled = sample("OA9ZZZ");
        disabled.enabled = false;
        let mut chilean = sample("CA3ABC");
        chilean.country = "CHL".to_string();
        registry
            .upsert_many(&[sample("OA4BAU"), disabled, chilean])
            .unwrap();

        assert_eq!(registry.count_all().unwrap(), 3);
        assert_eq!(registry.count_enabled().unwrap(), 2);

        let by_country = registry.counts_by_country().unwrap();
        assert_eq!(by_country[0], ("PER".to_string(), 2));
        assert_eq!(by_country[1], ("CHL".to_string(), 1));
    }

    #[test]
    fn open_is_idempotent_on_an_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.sqlite");

        {
            let mut registry = Registry::open(&path).unwrap();
            registry.upsert_many(&[sample("OA4BAU")]).unwrap();
        }

        let registry = Registry::open(&path).unwrap();
        assert_eq!(registry.count_all().unwrap(), 1);
    }
}
