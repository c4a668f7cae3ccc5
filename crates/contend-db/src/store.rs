use crate::{models::RecordRow, Error, Result};
use contend_core::{duration_millis, ContentionPolicy, NewRecord, Record, Settings};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_SERIALIZE_WAIT: Duration = Duration::from_secs(600);

const CREATE_RECORDS: &str = r#"
    CREATE TABLE records (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL CHECK (length(name) > 0),
        category TEXT NOT NULL CHECK (length(category) > 0)
    )
"#;

/// Where the shared store lives and how writers treat each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub policy: ContentionPolicy,
    pub busy_grace: Duration,
    pub serialize_wait: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: ContentionPolicy::default(),
            busy_grace: DEFAULT_BUSY_GRACE,
            serialize_wait: DEFAULT_SERIALIZE_WAIT,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            path: settings.database.clone(),
            policy: settings.policy,
            busy_grace: settings.busy_grace(),
            serialize_wait: settings.serialize_wait(),
        }
    }

    pub fn with_policy(mut self, policy: ContentionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_busy_grace(mut self, grace: Duration) -> Self {
        self.busy_grace = grace;
        self
    }

    pub fn with_serialize_wait(mut self, wait: Duration) -> Self {
        self.serialize_wait = wait;
        self
    }

    /// How long a writer waits for the write lock before reporting busy.
    pub fn lock_wait(&self) -> Duration {
        match self.policy {
            ContentionPolicy::FailFast => self.busy_grace,
            ContentionPolicy::Serialize => self.serialize_wait,
        }
    }
}

/// Lifecycle of a single insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    TransactionOpen,
    HoldingCommit,
    Committed,
    Aborted,
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TxState::Idle => "idle",
            TxState::TransactionOpen => "transaction_open",
            TxState::HoldingCommit => "holding_commit",
            TxState::Committed => "committed",
            TxState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Handle to the shared record table.
///
/// The handle carries configuration only. Every operation opens its own
/// connection, so concurrent holders of a cloned handle share nothing but the
/// database file and its locks.
#[derive(Debug, Clone)]
pub struct SharedStore {
    config: StoreConfig,
}

impl SharedStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn policy(&self) -> ContentionPolicy {
        self.config.policy
    }

    fn connect_options(&self, busy_timeout: Duration) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout)
    }

    async fn open(&self, busy_timeout: Duration) -> Result<SqliteConnection> {
        self.connect_options(busy_timeout)
            .connect()
            .await
            .map_err(Error::opening)
    }

    async fn close(conn: SqliteConnection) {
        if let Err(e) = conn.close().await {
            tracing::debug!("Failed to close store connection cleanly: {}", e);
        }
    }

    /// Drop and recreate the record table.
    pub async fn reset(&self) -> Result<()> {
        tracing::info!(path = %self.config.path.display(), "Resetting shared store");

        let mut conn = self.open(self.config.serialize_wait).await?;
        let result = Self::recreate(&mut conn).await;
        Self::close(conn).await;
        result?;

        tracing::info!("Table 'records' recreated");
        Ok(())
    }

    async fn recreate(conn: &mut SqliteConnection) -> Result<()> {
        begin_immediate(conn).await?;

        let result: Result<()> = async {
            sqlx::query("DROP TABLE IF EXISTS records")
                .execute(&mut *conn)
                .await
                .map_err(Error::classify)?;
            sqlx::query(CREATE_RECORDS)
                .execute(&mut *conn)
                .await
                .map_err(Error::classify)?;
            Ok(())
        }
        .await;

        finish(conn, result).await
    }

    /// Insert one record, keeping the transaction open for `hold` before
    /// committing.
    ///
    /// While the transaction is held any other writer either queues
    /// (`Serialize`) or fails with [`Error::Busy`] (`FailFast`).
    pub async fn insert(&self, record: &NewRecord, hold: Duration) -> Result<Record> {
        let result = match self.open(self.config.lock_wait()).await {
            Ok(mut conn) => {
                let result = self.insert_on(&mut conn, record, hold).await;
                Self::close(conn).await;
                result
            }
            Err(e) => Err(e),
        };
        tracing::debug!(state = %TxState::Idle, %record, "connection released");
        result
    }

    async fn insert_on(
        &self,
        conn: &mut SqliteConnection,
        record: &NewRecord,
        hold: Duration,
    ) -> Result<Record> {
        tracing::debug!(state = %TxState::Idle, %record, policy = %self.config.policy, "opening write transaction");
        begin_immediate(conn).await?;
        tracing::debug!(state = %TxState::TransactionOpen, %record, "write lock acquired");

        let result: Result<Record> = async {
            let id = sqlx::query("INSERT INTO records (name, category) VALUES (?, ?)")
                .bind(&record.name)
                .bind(&record.category)
                .execute(&mut *conn)
                .await
                .map_err(Error::classify)?
                .last_insert_rowid();

            let hold_ms = duration_millis(hold);
            tracing::debug!(state = %TxState::HoldingCommit, id, hold_ms, "holding transaction");
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }

            Ok(Record {
                id,
                name: record.name.clone(),
                category: record.category.clone(),
            })
        }
        .await;

        finish(conn, result).await
    }

    /// All records in identity order.
    pub async fn records(&self) -> Result<Vec<Record>> {
        let mut conn = self.open(self.config.serialize_wait).await?;
        let result = sqlx::query_as::<_, RecordRow>(
            "SELECT id, name, category FROM records ORDER BY id",
        )
        .fetch_all(&mut conn)
        .await
        .map_err(Error::classify);
        Self::close(conn).await;

        Ok(result?.into_iter().map(Record::from).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let mut conn = self.open(self.config.serialize_wait).await?;
        let result = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM records")
            .fetch_one(&mut conn)
            .await
            .map_err(Error::classify);
        Self::close(conn).await;

        result
    }
}

async fn begin_immediate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(Error::classify)?;
    Ok(())
}

/// Commit on success, roll back on failure.
async fn finish<T>(conn: &mut SqliteConnection, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => {
                tracing::debug!(state = %TxState::Committed, "transaction committed");
                Ok(value)
            }
            Err(e) => {
                rollback(conn).await;
                Err(Error::classify(e))
            }
        },
        Err(e) => {
            rollback(conn).await;
            Err(e)
        }
    }
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        tracing::warn!(error = %e, "rollback failed");
    }
    tracing::debug!(state = %TxState::Aborted, "transaction aborted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, policy: ContentionPolicy) -> SharedStore {
        SharedStore::new(
            StoreConfig::new(dir.path().join("shared.db"))
                .with_policy(policy)
                .with_serialize_wait(Duration::from_secs(30)),
        )
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::FailFast);

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        store
            .insert(&NewRecord::new("Ace", "Dog"), Duration::ZERO)
            .await
            .unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::FailFast);
        store.reset().await.unwrap();

        let ace = store
            .insert(&NewRecord::new("Ace", "Dog"), Duration::ZERO)
            .await
            .unwrap();
        let felix = store
            .insert(&NewRecord::new("Felix", "Cat"), Duration::ZERO)
            .await
            .unwrap();

        assert_ne!(ace.id, felix.id);

        let records = store.records().await.unwrap();
        assert_eq!(records, vec![ace.clone(), felix]);
        assert_eq!(records[0].fields(), NewRecord::new("Ace", "Dog"));
    }

    #[tokio::test]
    async fn test_empty_name_violates_constraint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::FailFast);
        store.reset().await.unwrap();

        let err = store
            .insert(&NewRecord::new("", "Dog"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)), "unexpected error: {err}");

        // The aborted transaction must not leave the store locked.
        tokio_test::assert_ok!(
            store
                .insert(&NewRecord::new("Buddy", "Dog"), Duration::ZERO)
                .await
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unopenable_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedStore::new(StoreConfig::new(
            dir.path().join("missing").join("nested").join("shared.db"),
        ));

        let err = store.reset().await.unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)), "unexpected error: {err}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_fail_fast_rejects_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedStore::new(
            StoreConfig::new(dir.path().join("shared.db"))
                .with_busy_grace(Duration::from_millis(50)),
        );
        store.reset().await.unwrap();

        let holder = store.clone();
        let held = tokio::spawn(async move {
            holder
                .insert(&NewRecord::new("Ace", "Dog"), Duration::from_millis(600))
                .await
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        let err = store
            .insert(&NewRecord::new("Cooper", "Rabbit"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.is_busy(), "unexpected error: {err}");

        tokio_test::assert_ok!(held.await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serialize_queues_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::Serialize);
        store.reset().await.unwrap();

        let holder = store.clone();
        let held = tokio::spawn(async move {
            holder
                .insert(&NewRecord::new("Ace", "Dog"), Duration::from_millis(400))
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        store
            .insert(&NewRecord::new("Cooper", "Rabbit"), Duration::ZERO)
            .await
            .unwrap();

        // Queued behind the holder for most of its hold.
        assert!(started.elapsed() >= Duration::from_millis(150));
        tokio_test::assert_ok!(held.await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_default_grace_covers_a_zero_hold_commit() {
        let config = StoreConfig::new("x.db");
        assert_eq!(config.policy, ContentionPolicy::FailFast);
        assert_eq!(config.lock_wait(), Duration::from_secs(5));
    }

    /// Collects formatted `contend_db` log lines.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn states(&self) -> Vec<String> {
            let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
            text.lines()
                .filter_map(|line| line.split_whitespace().find_map(|f| f.strip_prefix("state=")))
                .map(str::to_string)
                .collect()
        }
    }

    fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter("contend_db=debug")
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        (captured, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_insert_logs_full_state_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::FailFast);
        store.reset().await.unwrap();

        let (captured, _guard) = capture();
        store
            .insert(&NewRecord::new("Ace", "Dog"), Duration::from_millis(5))
            .await
            .unwrap();

        assert_eq!(
            captured.states(),
            vec!["idle", "transaction_open", "holding_commit", "committed", "idle"]
        );
    }

    #[tokio::test]
    async fn test_rejected_insert_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, ContentionPolicy::FailFast);
        store.reset().await.unwrap();

        let (captured, _guard) = capture();
        store
            .insert(&NewRecord::new("", "Dog"), Duration::ZERO)
            .await
            .unwrap_err();

        assert_eq!(
            captured.states(),
            vec!["idle", "transaction_open", "aborted", "idle"]
        );
    }

    #[test]
    fn test_lock_wait_follows_policy() {
        let config = StoreConfig::new("x.db")
            .with_busy_grace(Duration::from_millis(5))
            .with_serialize_wait(Duration::from_secs(9));

        assert_eq!(config.lock_wait(), Duration::from_millis(5));
        assert_eq!(
            config.with_policy(ContentionPolicy::Serialize).lock_wait(),
            Duration::from_secs(9)
        );
    }
}
