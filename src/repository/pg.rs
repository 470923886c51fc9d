use super::schema::file_snapshot;
use super::{check_snapshot_keys, Flavor, Repository};
use crate::error::RepoError;
use crate::model::{FileRecord, Snapshot};
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{ConnectionError, DatabaseErrorKind, Error as DieselError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Insertable)]
#[diesel(table_name = file_snapshot)]
struct NewFileSnapshot {
    node_name: String,
    mount_path: String,
    file_list: Vec<String>,
    records: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl NewFileSnapshot {
    fn from_snapshot(snapshot: &Snapshot) -> Result<NewFileSnapshot, RepoError> {
        let records = serde_json::to_value(&snapshot.records)
            .map_err(|e| RepoError::SchemaViolation(format!("Serialize error: {}", e)))?;
        Ok(NewFileSnapshot {
            node_name: snapshot.reporter_identity.clone(),
            mount_path: snapshot.scanned_path.to_string_lossy().into_owned(),
            file_list: snapshot.file_names(),
            records,
            created_at: snapshot.captured_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = file_snapshot)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct FileSnapshotRow {
    #[allow(dead_code)]
    id: i64,
    node_name: String,
    mount_path: String,
    file_list: Vec<String>,
    records: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl FileSnapshotRow {
    fn into_snapshot(self) -> Result<Snapshot, RepoError> {
        let records: Vec<FileRecord> = serde_json::from_value(self.records)
            .map_err(|e| RepoError::SchemaViolation(format!("Deserialize error: {}", e)))?;
        if records.len() != self.file_list.len() {
            return Err(RepoError::SchemaViolation(format!(
                "row for {} lists {} names but {} records",
                self.mount_path,
                self.file_list.len(),
                records.len()
            )));
        }
        Ok(Snapshot {
            reporter_identity: self.node_name,
            scanned_path: PathBuf::from(self.mount_path),
            records,
            captured_at: self.created_at,
        })
    }
}

/// Append-only log in PostgreSQL: one `file_snapshot` row per write.
///
/// The connection is dropped after a connection-level failure and
/// re-established on the next call.
pub struct PgEventLog {
    database_url: String,
    connection: Mutex<Option<PgConnection>>,
}

impl PgEventLog {
    /// Connect and create the schema if it does not exist yet.
    pub fn connect(database_url: &str) -> Result<Self, RepoError> {
        let mut connection = establish_connection(database_url)?;
        connection
            .batch_execute(include_str!("schema.sql"))
            .map_err(map_diesel_error)?;
        debug!("PostgreSQL schema initialized");

        Ok(PgEventLog {
            database_url: database_url.to_string(),
            connection: Mutex::new(Some(connection)),
        })
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut PgConnection) -> QueryResult<T>,
    ) -> Result<T, RepoError> {
        let mut guard = self.connection.lock().map_err(|e| {
            RepoError::ConnectionFailure(format!("Failed to lock connection: {}", e))
        })?;

        if guard.is_none() {
            debug!("Re-establishing PostgreSQL connection");
            *guard = Some(establish_connection(&self.database_url)?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(RepoError::ConnectionFailure(
                "no PostgreSQL connection".to_string(),
            ));
        };

        let result = f(connection);
        result.map_err(|e| {
            let err = map_diesel_error(e);
            if err.is_recoverable() {
                warn!("Dropping PostgreSQL connection after error: {}", err);
                *guard = None;
            }
            err
        })
    }
}

impl Repository for PgEventLog {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn flavor(&self) -> Flavor {
        Flavor::AppendOnly
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        check_snapshot_keys(snapshot)?;
        let row = NewFileSnapshot::from_snapshot(snapshot)?;

        let rows = self.with_connection(|conn| {
            diesel::insert_into(file_snapshot::table)
                .values(&row)
                .execute(conn)
        })?;
        debug!("Inserted {} file_snapshot row(s) for {}", rows, row.mount_path);
        Ok(())
    }

    fn replace(&self, _snapshot: &Snapshot) -> Result<(), RepoError> {
        Err(RepoError::Unimplemented {
            backend: self.name(),
            operation: "replace",
        })
    }

    fn clear(&self, scanned_path: &Path) -> Result<(), RepoError> {
        let path = scanned_path.to_string_lossy().into_owned();
        let rows = self.with_connection(|conn| {
            diesel::delete(file_snapshot::table.filter(file_snapshot::mount_path.eq(path.as_str())))
                .execute(conn)
        })?;
        debug!("Deleted {} file_snapshot row(s) for {}", rows, path);
        Ok(())
    }

    fn read(&self, scanned_path: &Path) -> Result<Snapshot, RepoError> {
        let path = scanned_path.to_string_lossy().into_owned();
        let row = self.with_connection(|conn| {
            file_snapshot::table
                .filter(file_snapshot::mount_path.eq(path.as_str()))
                .order((file_snapshot::created_at.desc(), file_snapshot::id.desc()))
                .select(FileSnapshotRow::as_select())
                .first::<FileSnapshotRow>(conn)
                .optional()
        })?;

        match row {
            Some(row) => row.into_snapshot(),
            None => Err(RepoError::NotFound(scanned_path.to_path_buf())),
        }
    }

    fn history(&self, scanned_path: &Path) -> Result<Vec<Snapshot>, RepoError> {
        let path = scanned_path.to_string_lossy().into_owned();
        let rows = self.with_connection(|conn| {
            file_snapshot::table
                .filter(file_snapshot::mount_path.eq(path.as_str()))
                .order((file_snapshot::created_at.asc(), file_snapshot::id.asc()))
                .select(FileSnapshotRow::as_select())
                .load::<FileSnapshotRow>(conn)
        })?;

        rows.into_iter().map(FileSnapshotRow::into_snapshot).collect()
    }
}

fn establish_connection(database_url: &str) -> Result<PgConnection, RepoError> {
    PgConnection::establish(database_url).map_err(map_connection_error)
}

fn map_connection_error(err: ConnectionError) -> RepoError {
    RepoError::ConnectionFailure(format!("Error connecting to database: {}", err))
}

fn map_diesel_error(err: DieselError) -> RepoError {
    match err {
        DieselError::DatabaseError(kind, info) => match kind {
            DatabaseErrorKind::ClosedConnection
            | DatabaseErrorKind::UnableToSendCommand
            | DatabaseErrorKind::SerializationFailure
            | DatabaseErrorKind::ReadOnlyTransaction => {
                RepoError::ConnectionFailure(info.message().to_string())
            }
            // Constraint violations and statement errors the server rejected.
            _ => RepoError::SchemaViolation(info.message().to_string()),
        },
        DieselError::SerializationError(e) | DieselError::DeserializationError(e) => {
            RepoError::SchemaViolation(e.to_string())
        }
        other => RepoError::ConnectionFailure(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io;

    fn make_snapshot() -> Snapshot {
        let records = vec![FileRecord {
            name: "a.txt".to_string(),
            full_path: "/mnt/data/a.txt".to_string(),
            owner_user: String::new(),
            mode: "-rw-r--r--".to_string(),
            size_bytes: 100,
            is_regular_file: true,
            modified_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }];
        Snapshot::build_at(
            "node-1",
            Path::new("/mnt/data"),
            records,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    fn row_from(new_row: NewFileSnapshot) -> FileSnapshotRow {
        FileSnapshotRow {
            id: 1,
            node_name: new_row.node_name,
            mount_path: new_row.mount_path,
            file_list: new_row.file_list,
            records: new_row.records,
            created_at: new_row.created_at,
        }
    }

    #[test]
    fn test_row_keeps_names_and_records() {
        let snapshot = make_snapshot();
        let new_row = NewFileSnapshot::from_snapshot(&snapshot).unwrap();
        assert_eq!(new_row.node_name, "node-1");
        assert_eq!(new_row.mount_path, "/mnt/data");
        assert_eq!(new_row.file_list, vec!["a.txt".to_string()]);

        let restored = row_from(new_row).into_snapshot().unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_malformed_records_are_a_schema_violation() {
        let mut row = row_from(NewFileSnapshot::from_snapshot(&make_snapshot()).unwrap());
        row.records = serde_json::json!({"not": "a list"});

        let err = row.into_snapshot().unwrap_err();
        assert!(matches!(err, RepoError::SchemaViolation(_)));
    }

    #[test]
    fn test_mismatched_name_list_is_a_schema_violation() {
        let mut row = row_from(NewFileSnapshot::from_snapshot(&make_snapshot()).unwrap());
        row.file_list.push("ghost.txt".to_string());

        let err = row.into_snapshot().unwrap_err();
        assert!(matches!(err, RepoError::SchemaViolation(_)));
    }

    #[test]
    fn test_error_mapping() {
        let err = map_diesel_error(DieselError::DeserializationError(Box::new(
            io::Error::new(io::ErrorKind::InvalidData, "bad bytes"),
        )));
        assert!(matches!(err, RepoError::SchemaViolation(_)));

        let err = map_diesel_error(DieselError::BrokenTransactionManager);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_server_side_statement_errors_are_not_retried() {
        let err = map_diesel_error(DieselError::DatabaseError(
            DatabaseErrorKind::Unknown,
            Box::new("invalid byte sequence for encoding \"UTF8\"".to_string()),
        ));
        assert!(matches!(err, RepoError::SchemaViolation(_)));
        assert!(!err.is_recoverable());

        let err = map_diesel_error(DieselError::DatabaseError(
            DatabaseErrorKind::CheckViolation,
            Box::new("file_snapshot_node_name_check".to_string()),
        ));
        assert!(matches!(err, RepoError::SchemaViolation(_)));

        let err = map_diesel_error(DieselError::DatabaseError(
            DatabaseErrorKind::ClosedConnection,
            Box::new("server closed the connection unexpectedly".to_string()),
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_pre_epoch_mtime_survives_row_conversion() {
        let mut snapshot = make_snapshot();
        snapshot.records[0].modified_at = Utc.with_ymd_and_hms(1969, 7, 20, 20, 17, 0).unwrap();
        snapshot.records[0].name = "bad\u{FFFD}.txt".to_string();

        let new_row = NewFileSnapshot::from_snapshot(&snapshot).unwrap();
        let restored = row_from(new_row).into_snapshot().unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_unreachable_server_is_a_connection_failure() {
        let result = PgEventLog::connect("postgres://nobody@127.0.0.1:1/none");
        assert!(matches!(result, Err(RepoError::ConnectionFailure(_))));
    }
}
