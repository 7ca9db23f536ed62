//! SQLite storage for detected sandwiches.

use crate::error::PersistenceError;
use crate::models::{hex_address, hex_hash, SandwichAttack};
use crate::sink::ResultSink;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    /// Open (or create) the SQLite database at `db_path` in WAL mode.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db_path = db_path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Connected to database at {}", db_path.display());

        Ok(Self { pool })
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the schema up to date.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

/// Result sink backed by the `sandwiches` and `sandwich_victims` tables.
///
/// Each append runs in one transaction, so a block's attacks land together
/// or not at all.
pub struct SqliteSink {
    db: DbPool,
}

impl SqliteSink {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let db = DbPool::new(db_path).await?;
        db.migrate().await?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Number of recorded sandwiches.
    pub async fn count(&self) -> Result<i64, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sandwiches")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ResultSink for SqliteSink {
    async fn append(&mut self, attacks: &[SandwichAttack]) -> Result<usize, PersistenceError> {
        if attacks.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.pool().begin().await?;
        let mut recorded = 0;

        for attack in attacks {
            let frontrun_tx = hex_hash(&attack.frontrun.tx_hash);
            let backrun_tx = hex_hash(&attack.backrun.tx_hash);

            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO sandwiches (
                    frontrun_tx, backrun_tx, block_number, timestamp,
                    pair_address, attacker_address, num_victims,
                    revenue_raw, revenue_eth, unprofitable
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&frontrun_tx)
            .bind(&backrun_tx)
            .bind(attack.block_number as i64)
            .bind(attack.timestamp as i64)
            .bind(hex_address(&attack.pair_id))
            .bind(hex_address(&attack.attacker))
            .bind(attack.num_victims() as i64)
            .bind(attack.revenue_raw.to_string())
            .bind(attack.revenue_eth.to_string())
            .bind(attack.unprofitable)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                continue;
            }
            recorded += 1;

            for (position, victim) in attack.victims.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO sandwich_victims (
                        frontrun_tx, backrun_tx, position, victim_tx,
                        victim_address, amount_in, amount_out
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&frontrun_tx)
                .bind(&backrun_tx)
                .bind(position as i64)
                .bind(hex_hash(&victim.tx_hash))
                .bind(hex_address(&victim.sender))
                .bind(victim.amount_in.to_string())
                .bind(victim.amount_out.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(recorded)
    }
}
