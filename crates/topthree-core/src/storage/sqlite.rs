//! SQLite-backed store for items, achievements and user stats.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations, sort_items, ItemFilter, ItemSort, PriorityStore, SlotFilter, WriteBatch};
use crate::error::{DatabaseError, Result};
use crate::model::{Achievement, AchievementType, DaySlot, PriorityItem, UserStats};

/// Key of the single stats row.
const STATS_KEY: &str = "singleton";

const ITEM_COLUMNS: &str = "id, title, is_completed, day_assigned, order_index, source_item_id,
     notes, calendar_event_id, calendar_event_start, created_at";

// === Helper Functions ===

fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_day(value: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| DatabaseError::CorruptRow {
        table: "items",
        message: format!("day_assigned '{value}': {e}"),
    })
}

fn parse_datetime(table: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            table,
            message: format!("timestamp '{value}': {e}"),
        })
}

/// Raw column values; decoded outside the rusqlite row closure so parse
/// failures surface as `CorruptRow` instead of being swallowed.
struct ItemRow {
    id: String,
    title: String,
    is_completed: bool,
    day_assigned: Option<String>,
    order_index: u32,
    source_item_id: Option<String>,
    notes: Option<String>,
    calendar_event_id: Option<String>,
    calendar_event_start: Option<String>,
    created_at: String,
}

impl ItemRow {
    fn read(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            is_completed: row.get(2)?,
            day_assigned: row.get(3)?,
            order_index: row.get(4)?,
            source_item_id: row.get(5)?,
            notes: row.get(6)?,
            calendar_event_id: row.get(7)?,
            calendar_event_start: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn decode(self) -> Result<PriorityItem, DatabaseError> {
        let slot = match self.day_assigned.as_deref() {
            Some(day) => DaySlot::AssignedTo(parse_day(day)?),
            None => DaySlot::Backlog,
        };
        let calendar_event_start = self
            .calendar_event_start
            .as_deref()
            .map(|s| parse_datetime("items", s))
            .transpose()?;
        Ok(PriorityItem {
            id: self.id,
            title: self.title,
            is_completed: self.is_completed,
            slot,
            order_index: self.order_index,
            source_item_id: self.source_item_id,
            notes: self.notes,
            calendar_event_id: self.calendar_event_id,
            calendar_event_start,
            created_at: parse_datetime("items", &self.created_at)?,
        })
    }
}

/// SQLite database for planner storage.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the database at `<data_dir>/topthree.db`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("topthree.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn where_clause(filter: &ItemFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        match filter.slot {
            SlotFilter::Any => {}
            SlotFilter::Backlog => clauses.push("day_assigned IS NULL".to_string()),
            SlotFilter::Assigned => clauses.push("day_assigned IS NOT NULL".to_string()),
            SlotFilter::Day(day) => {
                args.push(format_day(day));
                clauses.push(format!("day_assigned = ?{}", args.len()));
            }
            SlotFilter::Before(day) => {
                args.push(format_day(day));
                clauses.push(format!("day_assigned < ?{}", args.len()));
            }
            SlotFilter::OnOrBefore(day) => {
                args.push(format_day(day));
                clauses.push(format!("day_assigned <= ?{}", args.len()));
            }
        }
        if let Some(completed) = filter.completed {
            clauses.push(format!("is_completed = {}", i32::from(completed)));
        }
        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

fn write_item(tx: &rusqlite::Transaction, sql: &str, item: &PriorityItem) -> Result<(), rusqlite::Error> {
    tx.execute(
        sql,
        params![
            item.id,
            item.title,
            item.is_completed,
            item.day().map(format_day),
            item.order_index,
            item.source_item_id,
            item.notes,
            item.calendar_event_id,
            item.calendar_event_start.map(|dt| dt.to_rfc3339()),
            item.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl PriorityStore for SqliteStore {
    fn fetch_items(&self, filter: &ItemFilter, sort: ItemSort) -> Result<Vec<PriorityItem>> {
        let (where_sql, args) = Self::where_clause(filter);
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ITEM_COLUMNS} FROM items{where_sql}"))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), ItemRow::read)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.decode()?);
        }
        sort_items(&mut items, sort);
        Ok(items)
    }

    fn get_item(&self, id: &str) -> Result<Option<PriorityItem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                ItemRow::read,
            )
            .optional()?;
        Ok(row.map(ItemRow::decode).transpose()?)
    }

    fn achievements(&self) -> Result<Vec<Achievement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, type, earned_at, streak_count_at_award FROM achievements")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
            ))
        })?;

        let mut achievements = Vec::new();
        for row in rows {
            let (id, kind, earned_at, streak) = row?;
            let kind = AchievementType::parse(&kind).ok_or_else(|| DatabaseError::CorruptRow {
                table: "achievements",
                message: format!("unknown type '{kind}'"),
            })?;
            achievements.push(Achievement {
                id,
                kind,
                earned_at: parse_datetime("achievements", &earned_at)?,
                streak_count_at_award: streak,
            });
        }
        achievements.sort_by_key(|a| a.kind);
        Ok(achievements)
    }

    fn load_stats(&self) -> Result<Option<UserStats>> {
        let row = self
            .conn
            .query_row(
                "SELECT longest_streak, current_streak, total_top1_completed,
                        total_all_three_completed, freeze_token_count, last_updated_at
                 FROM user_stats WHERE key = ?1",
                params![STATS_KEY],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((longest, current, top1, all_three, tokens, updated)) = row else {
            return Ok(None);
        };
        Ok(Some(UserStats {
            longest_streak: longest,
            current_streak: current,
            total_top1_completed: top1,
            total_all_three_completed: all_three,
            freeze_token_count: tokens,
            last_updated_at: parse_datetime("user_stats", &updated)?,
        }))
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;

        for item in &batch.inserts {
            write_item(
                &tx,
                "INSERT INTO items (id, title, is_completed, day_assigned, order_index, source_item_id,
                     notes, calendar_event_id, calendar_event_start, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                item,
            )?;
        }
        for item in &batch.updates {
            write_item(
                &tx,
                "UPDATE items SET title = ?2, is_completed = ?3, day_assigned = ?4, order_index = ?5,
                     source_item_id = ?6, notes = ?7, calendar_event_id = ?8,
                     calendar_event_start = ?9, created_at = ?10
                 WHERE id = ?1",
                item,
            )?;
        }
        for id in &batch.deletes {
            tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        }
        for achievement in &batch.achievements {
            tx.execute(
                "INSERT INTO achievements (id, type, earned_at, streak_count_at_award)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    achievement.id,
                    achievement.kind.as_str(),
                    achievement.earned_at.to_rfc3339(),
                    achievement.streak_count_at_award,
                ],
            )?;
        }
        if let Some(stats) = &batch.stats {
            tx.execute(
                "INSERT INTO user_stats (key, longest_streak, current_streak, total_top1_completed,
                     total_all_three_completed, freeze_token_count, last_updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(key) DO UPDATE SET
                     longest_streak = excluded.longest_streak,
                     current_streak = excluded.current_streak,
                     total_top1_completed = excluded.total_top1_completed,
                     total_all_three_completed = excluded.total_all_three_completed,
                     freeze_token_count = excluded.freeze_token_count,
                     last_updated_at = excluded.last_updated_at",
                params![
                    STATS_KEY,
                    stats.longest_streak,
                    stats.current_streak,
                    stats.total_top1_completed,
                    stats.total_all_three_completed,
                    stats.freeze_token_count,
                    stats.last_updated_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn make_item(title: &str, slot: DaySlot, idx: u32) -> PriorityItem {
        PriorityItem::new(title, slot, idx, Utc::now()).unwrap()
    }

    #[test]
    fn create_and_get_item() {
        let mut db = SqliteStore::open_memory().unwrap();
        let mut item = make_item("Write tests", DaySlot::AssignedTo(day(3)), 1);
        item.notes = Some("unit + integration".into());
        item.calendar_event_start = Some(Utc::now());

        let mut batch = WriteBatch::new();
        batch.insert(item.clone());
        db.commit(batch).unwrap();

        let loaded = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Write tests");
        assert_eq!(loaded.slot, DaySlot::AssignedTo(day(3)));
        assert_eq!(loaded.order_index, 1);
        assert_eq!(loaded.notes.as_deref(), Some("unit + integration"));
        assert_eq!(loaded.created_at, item.created_at);
    }

    #[test]
    fn fetch_filters_by_day_and_completion() {
        let mut db = SqliteStore::open_memory().unwrap();
        let mut done = make_item("done", DaySlot::AssignedTo(day(1)), 0);
        done.is_completed = true;
        let open = make_item("open", DaySlot::AssignedTo(day(1)), 1);
        let later = make_item("later", DaySlot::AssignedTo(day(5)), 0);
        let parked = make_item("parked", DaySlot::Backlog, 0);

        let mut batch = WriteBatch::new();
        for item in [&done, &open, &later, &parked] {
            batch.insert(item.clone());
        }
        db.commit(batch).unwrap();

        let past_open = db
            .fetch_items(&ItemFilter::before(day(5)).completed(false), ItemSort::DayThenOrder)
            .unwrap();
        assert_eq!(past_open.len(), 1);
        assert_eq!(past_open[0].id, open.id);

        let backlog = db.fetch_items(&ItemFilter::backlog(), ItemSort::CreatedAt).unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].title, "parked");

        let first_day = db.fetch_items(&ItemFilter::day(day(1)), ItemSort::OrderIndex).unwrap();
        assert_eq!(first_day.iter().map(|i| i.title.as_str()).collect::<Vec<_>>(), ["done", "open"]);
    }

    #[test]
    fn update_and_delete_in_one_transaction() {
        let mut db = SqliteStore::open_memory().unwrap();
        let a = make_item("a", DaySlot::AssignedTo(day(1)), 0);
        let b = make_item("b", DaySlot::AssignedTo(day(1)), 1);
        let mut batch = WriteBatch::new();
        batch.insert(a.clone());
        batch.insert(b.clone());
        db.commit(batch).unwrap();

        let mut moved = b.clone();
        moved.slot = DaySlot::Backlog;
        let mut batch = WriteBatch::new();
        batch.update(moved);
        batch.delete(&a.id);
        db.commit(batch).unwrap();

        assert!(db.get_item(&a.id).unwrap().is_none());
        assert!(db.get_item(&b.id).unwrap().unwrap().slot.is_backlog());
    }

    #[test]
    fn duplicate_insert_rolls_back_whole_batch() {
        let mut db = SqliteStore::open_memory().unwrap();
        let a = make_item("a", DaySlot::Backlog, 0);
        let mut batch = WriteBatch::new();
        batch.insert(a.clone());
        db.commit(batch).unwrap();

        let fresh = make_item("fresh", DaySlot::Backlog, 0);
        let mut batch = WriteBatch::new();
        batch.insert(fresh.clone());
        batch.insert(a);
        assert!(db.commit(batch).is_err());
        assert!(db.get_item(&fresh.id).unwrap().is_none());
    }

    #[test]
    fn achievements_unique_per_type() {
        let mut db = SqliteStore::open_memory().unwrap();
        let mut batch = WriteBatch::new();
        batch.award(Achievement::new(AchievementType::WeekWarrior, 7, Utc::now()));
        db.commit(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.award(Achievement::new(AchievementType::WeekWarrior, 8, Utc::now()));
        assert!(db.commit(batch).is_err());

        let stored = db.achievements().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].streak_count_at_award, 7);
    }

    #[test]
    fn stats_singleton_upserts() {
        let mut db = SqliteStore::open_memory().unwrap();
        assert!(db.load_stats().unwrap().is_none());

        let mut stats = UserStats::empty(Utc::now());
        stats.freeze_token_count = 2;
        let mut batch = WriteBatch::new();
        batch.set_stats(stats.clone());
        db.commit(batch).unwrap();

        stats.freeze_token_count = 1;
        stats.last_updated_at += Duration::minutes(1);
        let mut batch = WriteBatch::new();
        batch.set_stats(stats.clone());
        db.commit(batch).unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM user_stats", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.load_stats().unwrap().unwrap().freeze_token_count, 1);
    }

    #[test]
    fn reopen_from_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topthree.db");
        let item = make_item("persisted", DaySlot::Backlog, 0);
        {
            let mut db = SqliteStore::open_at(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.insert(item.clone());
            db.commit(batch).unwrap();
        }
        let db = SqliteStore::open_at(&path).unwrap();
        assert_eq!(db.get_item(&item.id).unwrap().unwrap().title, "persisted");
    }
}
