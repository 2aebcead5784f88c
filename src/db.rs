use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

use crate::config::DatabaseConfig;
use crate::measurement::Measurement;
use crate::sender::Sender;

/// Stores measurements in an SQLite table. The connection is opened on demand,
/// so a database on removable or network storage counts as disconnected until
/// it can be opened.
#[derive(Debug)]
pub struct SqliteSender {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Option<Connection>,
}

impl SqliteSender {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            path: config.path.clone(),
            busy_timeout: config.busy_timeout(),
            conn: None,
        }
    }

    fn open(&self) -> Result<Connection, anyhow::Error> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open database file {}", self.path.display()))?;
        conn.busy_timeout(self.busy_timeout)
            .context("Failed to set busy timeout")?;
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS measurements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                temperature REAL,
                humidity REAL,
                pressure REAL,
                co2_concentration INTEGER,
                tvoc INTEGER,
                latitude REAL,
                longitude REAL
            );
            ",
        )
        .context("Failed to create table")?;
        Ok(conn)
    }

    fn insert(conn: &Connection, data: &Measurement) -> Result<(), anyhow::Error> {
        conn.execute(
            r"
            INSERT INTO measurements (timestamp, temperature, humidity, pressure, co2_concentration, tvoc, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                data.timestamp.to_rfc3339(),
                data.temperature,
                data.humidity,
                data.pressure,
                data.co2_concentration,
                data.tvoc,
                data.latitude,
                data.longitude,
            ],
        )
        .context("Failed to insert data into table")?;
        Ok(())
    }
}

impl Sender for SqliteSender {
    fn is_connected(&mut self) -> bool {
        if self.conn.is_none() {
            match self.open() {
                Ok(conn) => {
                    log::info!("Connected to database {}", self.path.display());
                    self.conn = Some(conn);
                }
                Err(e) => log::warn!("{e:#}"),
            }
        }
        self.conn.is_some()
    }

    fn send(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error> {
        let conn = self.conn.as_ref().context("Database is not connected")?;
        let result = Self::insert(conn, measurement);
        if result.is_err() {
            // Reopen on the next cycle in case the file went away.
            self.conn = None;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn config(path: PathBuf) -> DatabaseConfig {
        DatabaseConfig {
            path,
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_disconnected_until_directory_exists() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("mnt");
        let mut sender = SqliteSender::new(&config(mount.join("env.db")));

        assert!(!sender.is_connected());
        assert!(sender.send(&Measurement::default()).is_err());

        std::fs::create_dir(&mount).unwrap();
        assert!(sender.is_connected());
    }

    #[test]
    fn test_send_stores_absent_fields_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.db");
        let mut sender = SqliteSender::new(&config(path.clone()));
        assert!(sender.is_connected());

        let measurement = Measurement {
            timestamp: Local::now(),
            temperature: Some(22.5),
            humidity: Some(40.0),
            pressure: Some(101_325.0),
            co2_concentration: None,
            ..Measurement::default()
        };
        sender.send(&measurement).unwrap();

        let conn = Connection::open(&path).unwrap();
        let (temperature, co2, latitude): (Option<f64>, Option<i64>, Option<f64>) = conn
            .query_row(
                "SELECT temperature, co2_concentration, latitude FROM measurements",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(temperature, Some(22.5));
        assert_eq!(co2, None);
        assert_eq!(latitude, None);
    }
}
