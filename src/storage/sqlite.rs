//! `SqliteStorage`: the shipped [`super::Storage`] backend.
//!
//! A `rusqlite::Connection` behind `Arc<tokio::sync::Mutex<Connection>>`,
//! one table per entity family, compound fields JSON-serialized into
//! `TEXT` columns.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::error::{IndexerError, Result};
use crate::model::amount::Amount;
use crate::model::{DepositWithdrawal, EnrichedTransaction, Offer, OfferStatus, ResolutionMethod, Trade, TransferKind, UserConfig};

use super::{OfferPatch, Storage};

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| IndexerError::Store(e.to_string()))?;
        let storage = Self { conn: Arc::new(Mutex::new(conn)) };
        storage.migrate_sync()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| IndexerError::Store(e.to_string()))?;
        let storage = Self { conn: Arc::new(Mutex::new(conn)) };
        storage.migrate_sync()?;
        Ok(storage)
    }

    fn migrate_sync(&self) -> Result<()> {
        let conn = self
            .conn
            .try_lock()
            .expect("migrate runs before any concurrent access");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                wallets_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                ledger_index INTEGER NOT NULL,
                account TEXT NOT NULL,
                destination TEXT,
                transaction_type TEXT NOT NULL,
                transaction_result TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                nature TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                fee_native TEXT NOT NULL,
                balance_changes_json TEXT NOT NULL,
                trades_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_wallet
                ON transactions (user_id, account, destination, ledger_index);

            CREATE TABLE IF NOT EXISTS open_offers (
                hash TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                created_ledger_index INTEGER NOT NULL,
                last_checked_ledger INTEGER NOT NULL,
                taker_gets_json TEXT NOT NULL,
                taker_pays_json TEXT NOT NULL,
                filled_gets_json TEXT,
                filled_pays_json TEXT,
                status TEXT NOT NULL,
                created_date TEXT NOT NULL,
                resolved_date TEXT,
                resolved_ledger_index INTEGER,
                cancel_tx_hash TEXT,
                trades_json TEXT NOT NULL,
                create_fee_native TEXT NOT NULL,
                cancel_fee_native TEXT,
                resolution_method TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_open_offers_account_seq
                ON open_offers (account, sequence);

            CREATE TABLE IF NOT EXISTS filled_offers (
                hash TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                created_ledger_index INTEGER NOT NULL,
                last_checked_ledger INTEGER NOT NULL,
                taker_gets_json TEXT NOT NULL,
                taker_pays_json TEXT NOT NULL,
                filled_gets_json TEXT,
                filled_pays_json TEXT,
                status TEXT NOT NULL,
                created_date TEXT NOT NULL,
                resolved_date TEXT,
                resolved_ledger_index INTEGER,
                cancel_tx_hash TEXT,
                trades_json TEXT NOT NULL,
                create_fee_native TEXT NOT NULL,
                cancel_fee_native TEXT,
                resolution_method TEXT
            );

            CREATE TABLE IF NOT EXISTS canceled_offers (
                hash TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                created_ledger_index INTEGER NOT NULL,
                last_checked_ledger INTEGER NOT NULL,
                taker_gets_json TEXT NOT NULL,
                taker_pays_json TEXT NOT NULL,
                filled_gets_json TEXT,
                filled_pays_json TEXT,
                status TEXT NOT NULL,
                created_date TEXT NOT NULL,
                resolved_date TEXT,
                resolved_ledger_index INTEGER,
                cancel_tx_hash TEXT,
                trades_json TEXT NOT NULL,
                create_fee_native TEXT NOT NULL,
                cancel_fee_native TEXT,
                resolution_method TEXT
            );

            CREATE TABLE IF NOT EXISTS deposits_withdrawals (
                hash TEXT PRIMARY KEY,
                ledger_index INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                amount_json TEXT NOT NULL,
                kind TEXT NOT NULL,
                user_id TEXT NOT NULL,
                fee_native TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL,
                ledger_index INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                taker_address TEXT NOT NULL,
                maker_address TEXT NOT NULL,
                sold_amount_json TEXT NOT NULL,
                bought_amount_json TEXT NOT NULL,
                related_offer_sequence INTEGER,
                related_offer_hash TEXT,
                user_id TEXT,
                fee_native TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_related_offer
                ON trades (related_offer_hash);
            ",
        )
        .map_err(|e| IndexerError::Store(e.to_string()))?;
        Ok(())
    }
}

fn amount_to_json(amount: &Amount) -> String {
    serde_json::to_string(amount).expect("Amount serializes")
}

fn amount_from_json(s: &str) -> Amount {
    serde_json::from_str(s).expect("persisted Amount is well-formed")
}

fn decimal_to_text(d: Decimal) -> String {
    d.to_string()
}

fn decimal_from_text(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

fn row_to_offer(row: &rusqlite::Row) -> rusqlite::Result<Offer> {
    let filled_gets_json: Option<String> = row.get("filled_gets_json")?;
    let filled_pays_json: Option<String> = row.get("filled_pays_json")?;
    let resolved_date: Option<String> = row.get("resolved_date")?;
    let cancel_fee_native: Option<String> = row.get("cancel_fee_native")?;
    let resolution_method: Option<String> = row.get("resolution_method")?;
    let trades_json: String = row.get("trades_json")?;

    Ok(Offer {
        hash: row.get("hash")?,
        account: row.get("account")?,
        sequence: row.get::<_, i64>("sequence")? as u32,
        user_id: row.get("user_id")?,
        created_ledger_index: row.get::<_, i64>("created_ledger_index")? as u32,
        last_checked_ledger: row.get::<_, i64>("last_checked_ledger")? as u32,
        taker_gets: amount_from_json(&row.get::<_, String>("taker_gets_json")?),
        taker_pays: amount_from_json(&row.get::<_, String>("taker_pays_json")?),
        filled_gets: filled_gets_json.as_deref().map(amount_from_json),
        filled_pays: filled_pays_json.as_deref().map(amount_from_json),
        status: match row.get::<_, String>("status")?.as_str() {
            "OPEN" => OfferStatus::Open,
            "PARTIALLY_FILLED" => OfferStatus::PartiallyFilled,
            "FILLED" => OfferStatus::Filled,
            _ => OfferStatus::Canceled,
        },
        created_date: row
            .get::<_, String>("created_date")?
            .parse::<DateTime<Utc>>()
            .unwrap_or_default(),
        resolved_date: resolved_date.and_then(|s| s.parse().ok()),
        resolved_ledger_index: row
            .get::<_, Option<i64>>("resolved_ledger_index")?
            .map(|v| v as u32),
        cancel_tx_hash: row.get("cancel_tx_hash")?,
        trades: serde_json::from_str(&trades_json).unwrap_or_default(),
        create_fee_native: decimal_from_text(&row.get::<_, String>("create_fee_native")?),
        cancel_fee_native: cancel_fee_native.as_deref().map(decimal_from_text),
        resolution_method: resolution_method.as_deref().map(|s| match s {
            "direct" => ResolutionMethod::Direct,
            _ => ResolutionMethod::Inferred,
        }),
    })
}

fn offer_status_text(status: OfferStatus) -> &'static str {
    match status {
        OfferStatus::Open => "OPEN",
        OfferStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OfferStatus::Filled => "FILLED",
        OfferStatus::Canceled => "CANCELED",
    }
}

fn resolution_method_text(method: ResolutionMethod) -> &'static str {
    match method {
        ResolutionMethod::Direct => "direct",
        ResolutionMethod::Inferred => "inferred",
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_users(&self) -> Result<Vec<UserConfig>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, wallets_json FROM users")
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let wallets_json: String = row.get(1)?;
                Ok((id, wallets_json))
            })
            .map_err(|e| IndexerError::Store(e.to_string()))?;

        let mut users = Vec::new();
        for row in rows {
            let (id, wallets_json) = row.map_err(|e| IndexerError::Store(e.to_string()))?;
            let wallets: Vec<String> = serde_json::from_str(&wallets_json)
                .map_err(|e| IndexerError::Store(e.to_string()))?;
            users.push(UserConfig { id, wallets });
        }
        Ok(users)
    }

    async fn put_users(&self, users: &[UserConfig]) -> Result<()> {
        let conn = self.conn.lock().await;
        for user in users {
            let wallets_json =
                serde_json::to_string(&user.wallets).map_err(|e| IndexerError::Store(e.to_string()))?;
            conn.execute(
                "INSERT INTO users (id, wallets_json) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET wallets_json = excluded.wallets_json",
                params![user.id, wallets_json],
            )
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        }
        Ok(())
    }

    async fn put_transaction(&self, tx: &EnrichedTransaction, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let balance_changes_json =
            serde_json::to_string(&tx.balance_changes).map_err(|e| IndexerError::Store(e.to_string()))?;
        let trades_json = serde_json::to_string(&tx.trades).map_err(|e| IndexerError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO transactions (
                hash, user_id, ledger_index, account, destination, transaction_type,
                transaction_result, sequence, nature, timestamp, fee_native,
                balance_changes_json, trades_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(hash) DO UPDATE SET
                user_id = excluded.user_id,
                nature = excluded.nature,
                balance_changes_json = excluded.balance_changes_json,
                trades_json = excluded.trades_json",
            params![
                tx.hash,
                user_id,
                tx.ledger_index,
                tx.account,
                tx.destination,
                tx.transaction_type,
                tx.transaction_result,
                tx.sequence,
                format!("{:?}", tx.nature),
                tx.timestamp.to_rfc3339(),
                decimal_to_text(tx.fee_native),
                balance_changes_json,
                trades_json,
            ],
        )
        .map_err(|e| IndexerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_latest_ledger_index(&self, user_id: &str, wallet: &str) -> Result<Option<u32>> {
        let conn = self.conn.lock().await;
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(ledger_index) FROM transactions
                 WHERE user_id = ?1 AND (account = ?2 OR destination = ?2)",
                params![user_id, wallet],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| IndexerError::Store(e.to_string()))?
            .flatten();
        Ok(max.map(|v| v as u32))
    }

    async fn put_open_offer(&self, offer: &Offer) -> Result<()> {
        let conn = self.conn.lock().await;
        insert_offer_row(&conn, "open_offers", offer)
    }

    async fn update_open_offer(&self, hash: &str, patch: OfferPatch) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut offer = {
            let mut stmt = conn
                .prepare("SELECT * FROM open_offers WHERE hash = ?1")
                .map_err(|e| IndexerError::Store(e.to_string()))?;
            stmt.query_row(params![hash], row_to_offer)
                .optional()
                .map_err(|e| IndexerError::Store(e.to_string()))?
        }
        .ok_or_else(|| IndexerError::LifecycleViolation(format!("open offer {hash} not found")))?;

        patch.apply(&mut offer);

        if offer.is_terminal() {
            conn.execute("DELETE FROM open_offers WHERE hash = ?1", params![hash])
                .map_err(|e| IndexerError::Store(e.to_string()))?;
            let table = if offer.status == OfferStatus::Filled {
                "filled_offers"
            } else {
                "canceled_offers"
            };
            insert_offer_row(&conn, table, &offer)
        } else {
            insert_offer_row(&conn, "open_offers", &offer)
        }
    }

    async fn delete_open_offer(&self, hash: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM open_offers WHERE hash = ?1", params![hash])
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_open_offer_by_sequence(&self, account: &str, sequence: u32) -> Result<Option<Offer>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM open_offers WHERE account = ?1 AND sequence = ?2")
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        stmt.query_row(params![account, sequence], row_to_offer)
            .optional()
            .map_err(|e| IndexerError::Store(e.to_string()))
    }

    async fn list_open_offers(&self) -> Result<Vec<Offer>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM open_offers")
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        let rows = stmt
            .query_map([], row_to_offer)
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        let mut offers = Vec::new();
        for row in rows {
            offers.push(row.map_err(|e| IndexerError::Store(e.to_string()))?);
        }
        Ok(offers)
    }

    async fn put_filled_offer(&self, offer: &Offer) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM open_offers WHERE hash = ?1", params![offer.hash])
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        insert_offer_row(&conn, "filled_offers", offer)
    }

    async fn put_canceled_offer(&self, offer: &Offer) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM open_offers WHERE hash = ?1", params![offer.hash])
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        insert_offer_row(&conn, "canceled_offers", offer)
    }

    async fn put_deposit_withdrawal(&self, record: &DepositWithdrawal) -> Result<()> {
        let conn = self.conn.lock().await;
        let amount_json = amount_to_json(&record.amount);
        let kind = match record.kind {
            TransferKind::Deposit => "deposit",
            TransferKind::Withdrawal => "withdrawal",
            TransferKind::InternalTransfer => "internal_transfer",
        };
        conn.execute(
            "INSERT INTO deposits_withdrawals (
                hash, ledger_index, timestamp, from_address, to_address, amount_json, kind, user_id, fee_native
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(hash) DO NOTHING",
            params![
                record.hash,
                record.ledger_index,
                record.timestamp.to_rfc3339(),
                record.from_address,
                record.to_address,
                amount_json,
                kind,
                record.user_id,
                decimal_to_text(record.fee_native),
            ],
        )
        .map_err(|e| IndexerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_terminal_offer(&self, hash: &str) -> Result<Option<Offer>> {
        let conn = self.conn.lock().await;
        if let Some(offer) = select_offer_by_hash(&conn, "filled_offers", hash)? {
            return Ok(Some(offer));
        }
        select_offer_by_hash(&conn, "canceled_offers", hash)
    }

    async fn put_trade(&self, trade: &Trade) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO trades (
                hash, ledger_index, timestamp, taker_address, maker_address,
                sold_amount_json, bought_amount_json, related_offer_sequence,
                related_offer_hash, user_id, fee_native
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                trade.hash,
                trade.ledger_index,
                trade.timestamp.to_rfc3339(),
                trade.taker_address,
                trade.maker_address,
                amount_to_json(&trade.sold_amount),
                amount_to_json(&trade.bought_amount),
                trade.related_offer_sequence,
                trade.related_offer_hash,
                trade.user_id,
                decimal_to_text(trade.fee_native),
            ],
        )
        .map_err(|e| IndexerError::Store(e.to_string()))?;
        Ok(())
    }

    async fn list_trades(&self, related_offer_hash: &str) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT hash, ledger_index, timestamp, taker_address, maker_address,
                        sold_amount_json, bought_amount_json, related_offer_sequence,
                        related_offer_hash, user_id, fee_native
                 FROM trades WHERE related_offer_hash = ?1",
            )
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![related_offer_hash], |row| {
                Ok(Trade {
                    hash: row.get(0)?,
                    ledger_index: row.get::<_, i64>(1)? as u32,
                    timestamp: row
                        .get::<_, String>(2)?
                        .parse::<DateTime<Utc>>()
                        .unwrap_or_default(),
                    taker_address: row.get(3)?,
                    maker_address: row.get(4)?,
                    sold_amount: amount_from_json(&row.get::<_, String>(5)?),
                    bought_amount: amount_from_json(&row.get::<_, String>(6)?),
                    related_offer_sequence: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                    related_offer_hash: row.get(8)?,
                    user_id: row.get(9)?,
                    fee_native: decimal_from_text(&row.get::<_, String>(10)?),
                })
            })
            .map_err(|e| IndexerError::Store(e.to_string()))?;
        let mut trades = Vec::new();
        for row in rows {
            trades.push(row.map_err(|e| IndexerError::Store(e.to_string()))?);
        }
        Ok(trades)
    }
}

fn select_offer_by_hash(conn: &Connection, table: &str, hash: &str) -> Result<Option<Offer>> {
    let sql = format!("SELECT * FROM {table} WHERE hash = ?1");
    let mut stmt = conn.prepare(&sql).map_err(|e| IndexerError::Store(e.to_string()))?;
    stmt.query_row(params![hash], row_to_offer)
        .optional()
        .map_err(|e| IndexerError::Store(e.to_string()))
}

fn insert_offer_row(conn: &Connection, table: &str, offer: &Offer) -> Result<()> {
    let trades_json = serde_json::to_string(&offer.trades).map_err(|e| IndexerError::Store(e.to_string()))?;
    let sql = format!(
        "INSERT INTO {table} (
            hash, account, sequence, user_id, created_ledger_index, last_checked_ledger,
            taker_gets_json, taker_pays_json, filled_gets_json, filled_pays_json,
            status, created_date, resolved_date, resolved_ledger_index, cancel_tx_hash,
            trades_json, create_fee_native, cancel_fee_native, resolution_method
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
        ON CONFLICT(hash) DO UPDATE SET
            last_checked_ledger = excluded.last_checked_ledger,
            filled_gets_json = excluded.filled_gets_json,
            filled_pays_json = excluded.filled_pays_json,
            status = excluded.status,
            resolved_date = excluded.resolved_date,
            resolved_ledger_index = excluded.resolved_ledger_index,
            cancel_tx_hash = excluded.cancel_tx_hash,
            trades_json = excluded.trades_json,
            cancel_fee_native = excluded.cancel_fee_native,
            resolution_method = excluded.resolution_method"
    );
    conn.execute(
        &sql,
        params![
            offer.hash,
            offer.account,
            offer.sequence,
            offer.user_id,
            offer.created_ledger_index,
            offer.last_checked_ledger,
            amount_to_json(&offer.taker_gets),
            amount_to_json(&offer.taker_pays),
            offer.filled_gets.as_ref().map(amount_to_json),
            offer.filled_pays.as_ref().map(amount_to_json),
            offer_status_text(offer.status),
            offer.created_date.to_rfc3339(),
            offer.resolved_date.map(|d| d.to_rfc3339()),
            offer.resolved_ledger_index,
            offer.cancel_tx_hash,
            trades_json,
            decimal_to_text(offer.create_fee_native),
            offer.cancel_fee_native.map(decimal_to_text),
            offer.resolution_method.map(resolution_method_text),
        ],
    )
    .map_err(|e| IndexerError::Store(e.to_string()))?;
    Ok(())
}
