//! SQLite persistence: tickets, sellers, win percentages and draw results.
//!
//! The store is synchronous; async callers run it on `tokio::task::spawn_blocking`.
//! `draw_results` carries `UNIQUE(draw_date, draw_slot)`, and [`DrawStore::save`] checks
//! and inserts inside one `IMMEDIATE` transaction, so at most one result per draw is
//! ever written no matter how many processes race. [`DrawStore::save_before`] also
//! rolls back without inserting once a deadline has passed while it waited for the
//! write lock.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use lotto_types::{
    parse_draw_date, DrawKey, DrawResult, SelectionStrategy, SellerId, SlotLabel, StoredTicket,
    WinningEntry, DRAW_DATE_FORMAT,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long a writer waits on another connection's lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Outcome of [`DrawStore::save`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    AlreadyExists,
    /// The deadline passed before the insert could commit; nothing was written.
    DeadlinePassed,
}

/// A ticket to record, as the ticketing subsystem would write it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    pub seller_id: SellerId,
    pub draw_times: String,
    pub ticket_numbers: String,
    pub total_points: String,
    pub total_quantity: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DrawStore {
    conn: Arc<Mutex<Connection>>,
}

impl DrawStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open draw database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory draw database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        init_schema_sqlite(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                tracing::warn!("draw database connection lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Exact-match lookup of a persisted result.
    pub fn find_existing(&self, key: &DrawKey) -> anyhow::Result<Option<DrawResult>> {
        let conn = self.conn();
        find_result(&conn, key)
    }

    /// Insert a result unless one already exists for its key.
    pub fn save(&self, result: &DrawResult) -> anyhow::Result<SaveOutcome> {
        self.insert_result(result, None)
    }

    /// Like [`DrawStore::save`], but commits only while `deadline` has not passed.
    pub fn save_before(
        &self,
        result: &DrawResult,
        deadline: Instant,
    ) -> anyhow::Result<SaveOutcome> {
        self.insert_result(result, Some(deadline))
    }

    fn insert_result(
        &self,
        result: &DrawResult,
        deadline: Option<Instant>,
    ) -> anyhow::Result<SaveOutcome> {
        let past_deadline = || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        let key = result.key();
        let winning_numbers =
            serde_json::to_string(&result.winning_numbers).context("encode winning numbers")?;

        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("begin draw result transaction")?;
        if past_deadline() {
            return Ok(SaveOutcome::DeadlinePassed);
        }
        if find_result(&tx, &key)?.is_some() {
            return Ok(SaveOutcome::AlreadyExists);
        }
        let inserted = tx.execute(
            "INSERT INTO draw_results
                 (draw_date, draw_slot, slot_minutes, winning_numbers, total_points, strategy, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                date_text(&result.draw_date),
                result.draw_slot.to_string(),
                slot_minutes(&result.draw_slot),
                winning_numbers,
                result.total_points,
                result.strategy.as_str(),
                result.created_at.timestamp_millis(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                return Ok(SaveOutcome::AlreadyExists);
            }
            Err(err) => return Err(err).context("insert draw result"),
        }
        // dropping the transaction rolls the insert back
        if past_deadline() {
            return Ok(SaveOutcome::DeadlinePassed);
        }
        tx.commit().context("commit draw result")?;
        Ok(SaveOutcome::Inserted)
    }

    /// The result for `slot` on `date`, or the latest slot of the day when `slot` is `None`.
    pub fn latest_for_date(
        &self,
        date: NaiveDate,
        slot: Option<SlotLabel>,
    ) -> anyhow::Result<Option<DrawResult>> {
        if let Some(slot) = slot {
            return self.find_existing(&DrawKey::new(date, slot));
        }
        let conn = self.conn();
        conn.query_row(
            &format!("{SELECT_RESULT} WHERE draw_date = ?1 ORDER BY slot_minutes DESC LIMIT 1"),
            params![date_text(&date)],
            read_result_row,
        )
        .optional()
        .context("query latest draw result")?
        .map(decode_result_row)
        .transpose()
    }

    /// Every result of a day, in slot order.
    pub fn list_for_date(&self, date: NaiveDate) -> anyhow::Result<Vec<DrawResult>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "{SELECT_RESULT} WHERE draw_date = ?1 ORDER BY slot_minutes ASC"
            ))
            .context("prepare draw result listing")?;
        let rows = stmt.query_map(params![date_text(&date)], read_result_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(decode_result_row(row?)?);
        }
        Ok(results)
    }

    /// Tickets created in `[start, end)` with id greater than `after_id`, by ascending id.
    pub fn load_ticket_batch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        after_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<StoredTicket>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, seller_id, draw_times, ticket_numbers, total_points, total_quantity, created_at
                 FROM tickets
                 WHERE created_at >= ?1 AND created_at < ?2 AND id > ?3
                 ORDER BY id ASC
                 LIMIT ?4",
            )
            .context("prepare ticket batch query")?;
        let rows = stmt.query_map(
            params![
                start.timestamp_millis(),
                end.timestamp_millis(),
                after_id as i64,
                limit as i64
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            },
        )?;

        let mut tickets = Vec::new();
        for row in rows {
            let (id, seller_id, draw_times, ticket_numbers, total_points, total_quantity, created) =
                row?;
            let created_at = DateTime::<Utc>::from_timestamp_millis(created)
                .with_context(|| format!("ticket {id} has invalid created_at {created}"))?;
            tickets.push(StoredTicket {
                id: id as u64,
                seller_id: seller_id as SellerId,
                draw_times,
                ticket_numbers,
                total_points,
                total_quantity: total_quantity.max(0) as u64,
                created_at,
            });
        }
        Ok(tickets)
    }

    pub fn insert_ticket(&self, ticket: &NewTicket) -> anyhow::Result<u64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tickets (seller_id, draw_times, ticket_numbers, total_points, total_quantity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                ticket.seller_id as i64,
                ticket.draw_times,
                ticket.ticket_numbers,
                ticket.total_points,
                ticket.total_quantity as i64,
                ticket.created_at.timestamp_millis(),
            ],
        )
        .context("insert ticket")?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Sellers flagged for priority winning, by descending id.
    pub fn priority_sellers(&self) -> anyhow::Result<Vec<SellerId>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare_cached("SELECT id FROM sellers WHERE prior_winning = 1 ORDER BY id DESC")
            .context("prepare priority seller query")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut sellers = Vec::new();
        for row in rows {
            sellers.push(row? as SellerId);
        }
        Ok(sellers)
    }

    pub fn upsert_seller(&self, id: SellerId, name: &str, priority: bool) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sellers (id, name, prior_winning) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, prior_winning = excluded.prior_winning",
            params![id as i64, name, priority],
        )
        .context("upsert seller")?;
        Ok(())
    }

    /// Flip a seller's priority flag. Returns the new value, or `None` for an unknown seller.
    pub fn toggle_seller_priority(&self, id: SellerId) -> anyhow::Result<Option<bool>> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("begin seller toggle")?;
        let current: Option<bool> = tx
            .query_row(
                "SELECT prior_winning FROM sellers WHERE id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()
            .context("read seller priority")?;
        let Some(current) = current else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE sellers SET prior_winning = ?1 WHERE id = ?2",
            params![!current, id as i64],
        )
        .context("update seller priority")?;
        tx.commit().context("commit seller toggle")?;
        Ok(Some(!current))
    }

    /// The most recently recorded win percentage, or 0 when none was ever set.
    pub fn latest_win_percent(&self) -> anyhow::Result<f64> {
        let conn = self.conn();
        let latest: Option<f64> = conn
            .query_row(
                "SELECT percentage FROM win_percentages ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("read latest win percentage")?;
        Ok(latest.unwrap_or(0.0))
    }

    pub fn record_win_percent(&self, percentage: f64, at: DateTime<Utc>) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO win_percentages (percentage, created_at) VALUES (?1, ?2)",
            params![percentage, at.timestamp_millis()],
        )
        .context("record win percentage")?;
        Ok(())
    }
}

fn init_schema_sqlite(conn: &Connection) -> anyhow::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("set draw database busy timeout")?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS tickets (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             seller_id INTEGER NOT NULL,
             draw_times TEXT NOT NULL,
             ticket_numbers TEXT NOT NULL,
             total_points TEXT NOT NULL,
             total_quantity INTEGER NOT NULL DEFAULT 0,
             created_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at, id);
         CREATE TABLE IF NOT EXISTS sellers (
             id INTEGER PRIMARY KEY,
             name TEXT NOT NULL DEFAULT '',
             prior_winning INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS win_percentages (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             percentage REAL NOT NULL,
             created_at INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS draw_results (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             draw_date TEXT NOT NULL,
             draw_slot TEXT NOT NULL,
             slot_minutes INTEGER NOT NULL,
             winning_numbers TEXT NOT NULL,
             total_points REAL NOT NULL,
             strategy TEXT NOT NULL,
             created_at INTEGER NOT NULL,
             UNIQUE(draw_date, draw_slot)
         );",
    )
    .context("init draw database schema")?;
    Ok(())
}

const SELECT_RESULT: &str = "SELECT draw_date, draw_slot, winning_numbers, total_points, strategy, created_at
     FROM draw_results";

type ResultRow = (String, String, String, f64, String, i64);

fn read_result_row(row: &Row<'_>) -> rusqlite::Result<ResultRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_result_row(row: ResultRow) -> anyhow::Result<DrawResult> {
    let (draw_date, draw_slot, winning_numbers, total_points, strategy, created_at) = row;
    let winning_numbers: Vec<WinningEntry> =
        serde_json::from_str(&winning_numbers).context("decode winning numbers")?;
    Ok(DrawResult {
        draw_date: parse_draw_date(&draw_date).context("decode draw date")?,
        draw_slot: draw_slot.parse().context("decode draw slot")?,
        winning_numbers,
        total_points,
        strategy: strategy
            .parse::<SelectionStrategy>()
            .map_err(anyhow::Error::msg)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at)
            .with_context(|| format!("invalid result timestamp {created_at}"))?,
    })
}

fn find_result(conn: &Connection, key: &DrawKey) -> anyhow::Result<Option<DrawResult>> {
    conn.query_row(
        &format!("{SELECT_RESULT} WHERE draw_date = ?1 AND draw_slot = ?2"),
        params![date_text(&key.draw_date), key.draw_slot.to_string()],
        read_result_row,
    )
    .optional()
    .context("query draw result")?
    .map(decode_result_row)
    .transpose()
}

fn date_text(date: &NaiveDate) -> String {
    date.format(DRAW_DATE_FORMAT).to_string()
}

fn slot_minutes(slot: &SlotLabel) -> u32 {
    slot.hour() * 60 + slot.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotto_types::TicketNumber;

    fn sample_result(slot: &str, created_secs: i64) -> DrawResult {
        let number: TicketNumber = "1007".parse().expect("number");
        DrawResult {
            draw_date: parse_draw_date("2025-01-10").expect("date"),
            draw_slot: slot.parse().expect("slot"),
            winning_numbers: vec![WinningEntry::purchased(number, 2), WinningEntry::filler("3055".parse().expect("number"))],
            total_points: 1000.0,
            strategy: SelectionStrategy::QuantityDescending,
            created_at: DateTime::<Utc>::from_timestamp(created_secs, 0).expect("ts"),
        }
    }

    #[test]
    fn save_is_exactly_once() {
        let store = DrawStore::open_in_memory().expect("store");
        let result = sample_result("02:00 PM", 1_736_500_000);
        assert_eq!(store.save(&result).expect("save"), SaveOutcome::Inserted);
        assert_eq!(store.save(&result).expect("save"), SaveOutcome::AlreadyExists);

        let found = store.find_existing(&result.key()).expect("query").expect("row");
        assert_eq!(found, result);
        assert_eq!(store.list_for_date(result.draw_date).expect("list").len(), 1);
    }

    #[test]
    fn passed_deadline_writes_nothing() {
        let store = DrawStore::open_in_memory().expect("store");
        let result = sample_result("02:00 PM", 1_736_500_000);
        let passed = Instant::now();
        assert_eq!(
            store.save_before(&result, passed).expect("save"),
            SaveOutcome::DeadlinePassed
        );
        assert!(store.find_existing(&result.key()).expect("query").is_none());

        let later = Instant::now() + Duration::from_secs(60);
        assert_eq!(
            store.save_before(&result, later).expect("save"),
            SaveOutcome::Inserted
        );
    }

    #[test]
    fn latest_uses_slot_order() {
        let store = DrawStore::open_in_memory().expect("store");
        let evening = sample_result("11:45 PM", 1_736_500_000);
        let morning = sample_result("09:00 AM", 1_736_500_100);
        store.save(&evening).expect("save");
        store.save(&morning).expect("save");

        let date = evening.draw_date;
        let latest = store.latest_for_date(date, None).expect("query").expect("row");
        assert_eq!(latest.draw_slot, evening.draw_slot);
        let exact = store
            .latest_for_date(date, Some(morning.draw_slot))
            .expect("query")
            .expect("row");
        assert_eq!(exact, morning);

        let listed: Vec<_> = store
            .list_for_date(date)
            .expect("list")
            .into_iter()
            .map(|r| r.draw_slot.to_string())
            .collect();
        assert_eq!(listed, vec!["09:00 AM", "11:45 PM"]);
        assert!(store
            .latest_for_date(parse_draw_date("2025-01-11").expect("date"), None)
            .expect("query")
            .is_none());
    }

    #[test]
    fn ticket_batches_page_by_id_within_window() {
        let store = DrawStore::open_in_memory().expect("store");
        let base = DateTime::<Utc>::from_timestamp(1_736_500_000, 0).expect("ts");
        for offset in 0..5i64 {
            store
                .insert_ticket(&NewTicket {
                    seller_id: 7,
                    draw_times: "[\"02:00 PM\"]".to_string(),
                    ticket_numbers: "1007:1".to_string(),
                    total_points: "10".to_string(),
                    total_quantity: 1,
                    created_at: base + chrono::TimeDelta::hours(offset * 10),
                })
                .expect("insert");
        }
        let end = base + chrono::TimeDelta::hours(25);
        let first = store.load_ticket_batch(base, end, 0, 2).expect("batch");
        assert_eq!(first.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);
        let second = store.load_ticket_batch(base, end, 2, 2).expect("batch");
        assert_eq!(second.iter().map(|t| t.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(second[0].created_at, base + chrono::TimeDelta::hours(20));
    }

    #[test]
    fn sellers_and_percentages() {
        let store = DrawStore::open_in_memory().expect("store");
        assert_eq!(store.latest_win_percent().expect("pct"), 0.0);
        let base = DateTime::<Utc>::from_timestamp(1_736_500_000, 0).expect("ts");
        store.record_win_percent(40.0, base).expect("record");
        store
            .record_win_percent(55.5, base + chrono::TimeDelta::minutes(1))
            .expect("record");
        assert_eq!(store.latest_win_percent().expect("pct"), 55.5);

        store.upsert_seller(3, "north", true).expect("seller");
        store.upsert_seller(9, "south", true).expect("seller");
        store.upsert_seller(5, "east", false).expect("seller");
        assert_eq!(store.priority_sellers().expect("sellers"), vec![9, 3]);

        assert_eq!(store.toggle_seller_priority(5).expect("toggle"), Some(true));
        assert_eq!(store.toggle_seller_priority(9).expect("toggle"), Some(false));
        assert_eq!(store.toggle_seller_priority(42).expect("toggle"), None);
        assert_eq!(store.priority_sellers().expect("sellers"), vec![5, 3]);
    }
}
