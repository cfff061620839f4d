use crate::entities::{Bank, BankLookup, Offer, OfferFields};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Event for audit trail: every write to banks and offers is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

const ACTOR: &str = "offer_repository";

/// Optional range filter for `query_offers`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferFilter {
    pub price: Option<u64>,
    pub term: Option<u32>,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery, foreign keys for bank -> offer cascade
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;

    // ==========================================================================
    // Banks & Offers
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS banks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS offers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bank_id INTEGER NOT NULL REFERENCES banks(id) ON DELETE CASCADE,
            term_min INTEGER NOT NULL DEFAULT 0,
            term_max INTEGER NOT NULL DEFAULT 0,
            rate_min REAL NOT NULL DEFAULT 0,
            rate_max REAL NOT NULL DEFAULT 0,
            payment_min INTEGER NOT NULL DEFAULT 0,
            payment_max INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_offers_bank ON offers(bank_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_offers_payment ON offers(payment_min, payment_max)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Banks
// ============================================================================

pub fn find_bank_by_name(conn: &Connection, name: &str) -> Result<Option<Bank>> {
    let bank = conn
        .query_row(
            "SELECT id, name FROM banks WHERE name = ?1",
            [name.trim()],
            |row| Ok(Bank::new(row.get(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    Ok(bank)
}

/// Resolve a bank by name, inserting it when unknown
pub fn get_or_create_bank(conn: &Connection, name: &str) -> Result<BankLookup> {
    let name = name.trim();

    if let Some(bank) = find_bank_by_name(conn, name)? {
        return Ok(BankLookup::Found(bank));
    }

    conn.execute("INSERT INTO banks (name) VALUES (?1)", [name])
        .with_context(|| format!("Failed to create bank {:?}", name))?;
    let bank = Bank::new(conn.last_insert_rowid(), name);

    insert_event(
        conn,
        &Event::new(
            "bank_created",
            "bank",
            &bank.id.to_string(),
            serde_json::json!({ "name": bank.name }),
            ACTOR,
        ),
    )?;
    tracing::info!(bank_id = bank.id, name = %bank.name, "Created bank");

    Ok(BankLookup::Created(bank))
}

pub fn list_banks(conn: &Connection) -> Result<Vec<Bank>> {
    let mut stmt = conn.prepare("SELECT id, name FROM banks ORDER BY id")?;

    let banks = stmt
        .query_map([], |row| Ok(Bank::new(row.get(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(banks)
}

/// Delete a bank and, through the foreign key, all of its offers
pub fn delete_bank(conn: &Connection, id: i64) -> Result<bool> {
    let offers = count_offers_for_bank(conn, id)?;
    let deleted = conn.execute("DELETE FROM banks WHERE id = ?1", [id])? > 0;

    if deleted {
        insert_event(
            conn,
            &Event::new(
                "bank_deleted",
                "bank",
                &id.to_string(),
                serde_json::json!({ "cascaded_offers": offers }),
                ACTOR,
            ),
        )?;
        tracing::info!(bank_id = id, cascaded_offers = offers, "Deleted bank");
    }

    Ok(deleted)
}

fn count_offers_for_bank(conn: &Connection, bank_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM offers WHERE bank_id = ?1",
        [bank_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// Offers
// ============================================================================

const OFFER_COLUMNS: &str = "o.id, b.name, o.rate_min, o.rate_max, o.term_min, o.term_max,
                o.payment_min, o.payment_max";

fn amount_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<Offer> {
    Ok(Offer {
        id: row.get(0)?,
        bank_name: row.get(1)?,
        rate_min: row.get(2)?,
        rate_max: row.get(3)?,
        term_min: row.get(4)?,
        term_max: row.get(5)?,
        payment_min: amount_column(row, 6)?,
        payment_max: amount_column(row, 7)?,
    })
}

fn amount_param(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{} {} does not fit in storage", field, value))
}

pub fn get_offer(conn: &Connection, id: i64) -> Result<Option<Offer>> {
    let sql = format!(
        "SELECT {} FROM offers o JOIN banks b ON b.id = o.bank_id WHERE o.id = ?1",
        OFFER_COLUMNS
    );
    let offer = conn.query_row(&sql, [id], offer_from_row).optional()?;
    Ok(offer)
}

pub fn list_offers(conn: &Connection) -> Result<Vec<Offer>> {
    query_offers(conn, &OfferFilter::default())
}

/// Offers whose payment/term ranges contain the filter values
pub fn query_offers(conn: &Connection, filter: &OfferFilter) -> Result<Vec<Offer>> {
    // A price beyond i64 cannot fall inside any stored range
    let price = match filter.price.map(i64::try_from).transpose() {
        Ok(price) => price,
        Err(_) => return Ok(Vec::new()),
    };

    let sql = format!(
        "SELECT {} FROM offers o JOIN banks b ON b.id = o.bank_id
         WHERE (?1 IS NULL OR (o.payment_min <= ?1 AND o.payment_max >= ?1))
           AND (?2 IS NULL OR (o.term_min <= ?2 AND o.term_max >= ?2))
         ORDER BY o.id",
        OFFER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let offers = stmt
        .query_map(params![price, filter.term], offer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(offers)
}

pub fn create_offer(conn: &Connection, fields: &OfferFields) -> Result<Offer> {
    let tx = conn.unchecked_transaction()?;
    let bank = get_or_create_bank(&tx, &fields.bank_name)?.into_bank();

    tx.execute(
        "INSERT INTO offers (
            bank_id, term_min, term_max, rate_min, rate_max, payment_min, payment_max
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            bank.id,
            fields.term_min,
            fields.term_max,
            fields.rate_min,
            fields.rate_max,
            amount_param(fields.payment_min, "payment_min")?,
            amount_param(fields.payment_max, "payment_max")?,
        ],
    )?;
    let id = tx.last_insert_rowid();

    insert_event(
        &tx,
        &Event::new(
            "offer_created",
            "offer",
            &id.to_string(),
            serde_json::to_value(fields)?,
            ACTOR,
        ),
    )?;
    tx.commit()?;

    get_offer(conn, id)?.context("Offer vanished right after insert")
}

/// Overwrite every field of an offer; `None` if no such offer
pub fn update_offer(conn: &Connection, id: i64, fields: &OfferFields) -> Result<Option<Offer>> {
    let tx = conn.unchecked_transaction()?;
    let bank = get_or_create_bank(&tx, &fields.bank_name)?.into_bank();

    let updated = tx.execute(
        "UPDATE offers
         SET bank_id = ?1, term_min = ?2, term_max = ?3, rate_min = ?4, rate_max = ?5,
             payment_min = ?6, payment_max = ?7, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?8",
        params![
            bank.id,
            fields.term_min,
            fields.term_max,
            fields.rate_min,
            fields.rate_max,
            amount_param(fields.payment_min, "payment_min")?,
            amount_param(fields.payment_max, "payment_max")?,
            id,
        ],
    )?;

    if updated == 0 {
        // Roll back so an unknown offer id never leaves a new bank behind
        tx.rollback()?;
        return Ok(None);
    }

    insert_event(
        &tx,
        &Event::new(
            "offer_updated",
            "offer",
            &id.to_string(),
            serde_json::to_value(fields)?,
            ACTOR,
        ),
    )?;
    tx.commit()?;

    get_offer(conn, id)
}

pub fn delete_offer(conn: &Connection, id: i64) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM offers WHERE id = ?1", [id])? > 0;

    if deleted {
        insert_event(
            conn,
            &Event::new("offer_deleted", "offer", &id.to_string(), serde_json::json!({}), ACTOR),
        )?;
    }

    Ok(deleted)
}

pub fn count_offers(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM offers", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// Events
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn fields(bank: &str, term: (u32, u32), payment: (u64, u64)) -> OfferFields {
        OfferFields {
            bank_name: bank.to_string(),
            rate_min: 6.0,
            rate_max: 12.0,
            term_min: term.0,
            term_max: term.1,
            payment_min: payment.0,
            payment_max: payment.1,
        }
    }

    #[test]
    fn test_get_or_create_bank_is_idempotent() {
        let conn = test_db();

        let first = get_or_create_bank(&conn, "Sberbank").unwrap();
        let second = get_or_create_bank(&conn, "  Sberbank ").unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.bank(), second.bank());
        assert_eq!(list_banks(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_create_offer_resolves_bank_by_name() {
        let conn = test_db();

        let a = create_offer(&conn, &fields("VTB", (5, 30), (1_000_000, 10_000_000))).unwrap();
        let b = create_offer(&conn, &fields("VTB", (1, 10), (500_000, 3_000_000))).unwrap();

        assert_eq!(a.bank_name, "VTB");
        assert_eq!(b.bank_name, "VTB");
        assert_ne!(a.id, b.id);
        assert_eq!(list_banks(&conn).unwrap().len(), 1);
        assert_eq!(count_offers(&conn).unwrap(), 2);
    }

    #[test]
    fn test_query_offers_filters_by_ranges() {
        let conn = test_db();
        create_offer(&conn, &fields("A", (5, 30), (1_000_000, 10_000_000))).unwrap();
        create_offer(&conn, &fields("B", (1, 10), (500_000, 3_000_000))).unwrap();

        let both = query_offers(&conn, &OfferFilter { price: Some(2_000_000), term: Some(7) }).unwrap();
        assert_eq!(both.len(), 2);

        let long = query_offers(&conn, &OfferFilter { price: Some(2_000_000), term: Some(20) }).unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].bank_name, "A");

        // Bounds are inclusive
        let edge = query_offers(&conn, &OfferFilter { price: Some(500_000), term: Some(1) }).unwrap();
        assert_eq!(edge.len(), 1);
        assert_eq!(edge[0].bank_name, "B");

        let none = query_offers(&conn, &OfferFilter { price: Some(u64::MAX), term: Some(7) }).unwrap();
        assert!(none.is_empty());

        assert_eq!(list_offers(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_update_offer_replaces_fields_and_bank() {
        let conn = test_db();
        let offer = create_offer(&conn, &fields("A", (5, 30), (1_000_000, 10_000_000))).unwrap();

        let mut changed = offer.fields();
        changed.bank_name = "B".to_string();
        changed.term_max = 25;

        let updated = update_offer(&conn, offer.id, &changed).unwrap().unwrap();
        assert_eq!(updated.id, offer.id);
        assert_eq!(updated.bank_name, "B");
        assert_eq!(updated.term_max, 25);
        assert_eq!(list_banks(&conn).unwrap().len(), 2);
    }

    #[test]
    fn test_update_missing_offer_creates_nothing() {
        let conn = test_db();

        let result = update_offer(&conn, 42, &fields("Ghost", (1, 2), (1, 2))).unwrap();
        assert!(result.is_none());
        assert!(find_bank_by_name(&conn, "Ghost").unwrap().is_none());
    }

    #[test]
    fn test_delete_bank_cascades_offers() {
        let conn = test_db();
        let offer = create_offer(&conn, &fields("A", (5, 30), (1_000_000, 10_000_000))).unwrap();
        create_offer(&conn, &fields("B", (1, 10), (500_000, 3_000_000))).unwrap();
        let bank = find_bank_by_name(&conn, "A").unwrap().unwrap();

        assert!(delete_bank(&conn, bank.id).unwrap());

        assert!(get_offer(&conn, offer.id).unwrap().is_none());
        assert_eq!(count_offers(&conn).unwrap(), 1);
        assert!(!delete_bank(&conn, bank.id).unwrap());
    }

    #[test]
    fn test_delete_offer() {
        let conn = test_db();
        let offer = create_offer(&conn, &fields("A", (5, 30), (1_000_000, 10_000_000))).unwrap();

        assert!(delete_offer(&conn, offer.id).unwrap());
        assert!(!delete_offer(&conn, offer.id).unwrap());
        // Bank outlives its offers
        assert_eq!(list_banks(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_offer_history_is_recorded() {
        let conn = test_db();
        let offer = create_offer(&conn, &fields("A", (5, 30), (1_000_000, 10_000_000))).unwrap();
        let mut changed = offer.fields();
        changed.rate_max = 11.0;
        update_offer(&conn, offer.id, &changed).unwrap();

        let events = get_events_for_entity(&conn, "offer", &offer.id.to_string()).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();

        assert_eq!(types, vec!["offer_created", "offer_updated"]);
        assert_eq!(events[1].data["rate_max"], 11.0);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "test_event",
            "offer",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "offer", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "test_actor");
    }
}
