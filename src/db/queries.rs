use chrono::Utc;
use rusqlite::{params, Connection};

use crate::models::{
    AvailableSlot, BookOutcome, CancelOutcome, ExamSlotRow, OwnBooking, OwnExamBooking,
};

pub fn now_string() -> String {
    Utc::now()
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// ── Clinic info ──

pub fn get_info(conn: &Connection, topic: &str) -> anyhow::Result<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM info WHERE topic = ?1",
        params![topic],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Consultations ──

pub fn list_available_slots(
    conn: &Connection,
    specialty: &str,
) -> anyhow::Result<Vec<AvailableSlot>> {
    let mut stmt = conn.prepare(
        "SELECT cs.id, s.name, cs.start_datetime
         FROM consultation_slots cs
         JOIN staff s ON s.id = cs.staff_id
         WHERE cs.status = 'available'
           AND lower(s.specialty) LIKE '%' || lower(?1) || '%'
         ORDER BY cs.start_datetime ASC",
    )?;

    let rows = stmt.query_map(params![specialty], |row| {
        Ok(AvailableSlot {
            id: row.get(0)?,
            staff_name: row.get(1)?,
            start_datetime: row.get(2)?,
        })
    })?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

/// Check-then-book as one transaction: the slot flip and the booking row
/// commit together or not at all.
pub fn book_consultation(
    conn: &mut Connection,
    slot_id: i64,
    patient_name: &str,
    conversation_id: &str,
) -> anyhow::Result<BookOutcome> {
    let tx = conn.transaction()?;

    let status = match tx.query_row(
        "SELECT status FROM consultation_slots WHERE id = ?1",
        params![slot_id],
        |row| row.get::<_, String>(0),
    ) {
        Ok(status) => status,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(BookOutcome::SlotMissing),
        Err(e) => return Err(e.into()),
    };

    if status != "available" {
        return Ok(BookOutcome::SlotTaken);
    }

    tx.execute(
        "UPDATE consultation_slots SET status = 'booked' WHERE id = ?1",
        params![slot_id],
    )?;
    tx.execute(
        "INSERT INTO consultation_bookings (slot_id, patient_name, conversation_id, status)
         VALUES (?1, ?2, ?3, 'confirmed')",
        params![slot_id, patient_name, conversation_id],
    )?;

    tx.commit()?;
    Ok(BookOutcome::Booked)
}

pub fn list_own_bookings(
    conn: &Connection,
    conversation_id: &str,
    now: &str,
) -> anyhow::Result<Vec<OwnBooking>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, s.name, cs.start_datetime
         FROM consultation_bookings b
         JOIN consultation_slots cs ON cs.id = b.slot_id
         JOIN staff s ON s.id = cs.staff_id
         WHERE b.conversation_id = ?1
           AND b.status = 'confirmed'
           AND cs.start_datetime > ?2
         ORDER BY cs.start_datetime ASC",
    )?;

    let rows = stmt.query_map(params![conversation_id, now], |row| {
        Ok(OwnBooking {
            id: row.get(0)?,
            staff_name: row.get(1)?,
            start_datetime: row.get(2)?,
        })
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// Ownership is enforced by the compound (id, conversation_id) lookup; a
/// booking belonging to another conversation is indistinguishable from a
/// missing one.
pub fn cancel_consultation(
    conn: &mut Connection,
    booking_id: i64,
    conversation_id: &str,
) -> anyhow::Result<CancelOutcome> {
    let tx = conn.transaction()?;

    let (slot_id, status) = match tx.query_row(
        "SELECT slot_id, status FROM consultation_bookings
         WHERE id = ?1 AND conversation_id = ?2",
        params![booking_id, conversation_id],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    ) {
        Ok(found) => found,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(CancelOutcome::NotFound),
        Err(e) => return Err(e.into()),
    };

    if status != "confirmed" {
        return Ok(CancelOutcome::WrongStatus(status));
    }

    tx.execute(
        "UPDATE consultation_bookings SET status = 'cancelled' WHERE id = ?1",
        params![booking_id],
    )?;
    tx.execute(
        "UPDATE consultation_slots SET status = 'available' WHERE id = ?1",
        params![slot_id],
    )?;

    tx.commit()?;
    Ok(CancelOutcome::Cancelled)
}

// ── Exams ──

pub fn list_exam_types(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM exam_types ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut names = vec![];
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

pub fn list_exam_slots(conn: &Connection, exam_type: &str) -> anyhow::Result<Vec<ExamSlotRow>> {
    let mut stmt = conn.prepare(
        "SELECT es.id, es.start_datetime
         FROM exam_slots es
         JOIN exam_types et ON et.id = es.exam_type_id
         WHERE es.status = 'available'
           AND lower(et.name) LIKE '%' || lower(?1) || '%'
         ORDER BY es.start_datetime ASC",
    )?;

    let rows = stmt.query_map(params![exam_type], |row| {
        Ok(ExamSlotRow {
            id: row.get(0)?,
            start_datetime: row.get(1)?,
        })
    })?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn book_exam(
    conn: &mut Connection,
    exam_slot_id: i64,
    patient_name: &str,
    conversation_id: &str,
) -> anyhow::Result<BookOutcome> {
    let tx = conn.transaction()?;

    let status = match tx.query_row(
        "SELECT status FROM exam_slots WHERE id = ?1",
        params![exam_slot_id],
        |row| row.get::<_, String>(0),
    ) {
        Ok(status) => status,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(BookOutcome::SlotMissing),
        Err(e) => return Err(e.into()),
    };

    if status != "available" {
        return Ok(BookOutcome::SlotTaken);
    }

    tx.execute(
        "UPDATE exam_slots SET status = 'booked' WHERE id = ?1",
        params![exam_slot_id],
    )?;
    tx.execute(
        "INSERT INTO exam_bookings (exam_slot_id, patient_name, conversation_id, status)
         VALUES (?1, ?2, ?3, 'confirmed')",
        params![exam_slot_id, patient_name, conversation_id],
    )?;

    tx.commit()?;
    Ok(BookOutcome::Booked)
}

pub fn list_own_exam_bookings(
    conn: &Connection,
    conversation_id: &str,
    now: &str,
) -> anyhow::Result<Vec<OwnExamBooking>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, et.name, es.start_datetime
         FROM exam_bookings b
         JOIN exam_slots es ON es.id = b.exam_slot_id
         JOIN exam_types et ON et.id = es.exam_type_id
         WHERE b.conversation_id = ?1
           AND b.status = 'confirmed'
           AND es.start_datetime > ?2
         ORDER BY es.start_datetime ASC",
    )?;

    let rows = stmt.query_map(params![conversation_id, now], |row| {
        Ok(OwnExamBooking {
            id: row.get(0)?,
            exam_name: row.get(1)?,
            start_datetime: row.get(2)?,
        })
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn cancel_exam(
    conn: &mut Connection,
    exam_booking_id: i64,
    conversation_id: &str,
) -> anyhow::Result<CancelOutcome> {
    let tx = conn.transaction()?;

    let (exam_slot_id, status) = match tx.query_row(
        "SELECT exam_slot_id, status FROM exam_bookings
         WHERE id = ?1 AND conversation_id = ?2",
        params![exam_booking_id, conversation_id],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    ) {
        Ok(found) => found,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(CancelOutcome::NotFound),
        Err(e) => return Err(e.into()),
    };

    if status != "confirmed" {
        return Ok(CancelOutcome::WrongStatus(status));
    }

    tx.execute(
        "UPDATE exam_bookings SET status = 'cancelled' WHERE id = ?1",
        params![exam_booking_id],
    )?;
    tx.execute(
        "UPDATE exam_slots SET status = 'available' WHERE id = ?1",
        params![exam_slot_id],
    )?;

    tx.commit()?;
    Ok(CancelOutcome::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup_db() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        db::schema::seed_demo_data(&conn).unwrap();
        conn
    }

    #[test]
    fn test_info_lookup_is_pure_read() {
        let conn = setup_db();
        let first = get_info(&conn, "endereco").unwrap().unwrap();
        let second = get_info(&conn, "endereco").unwrap().unwrap();
        assert_eq!(first, second);
        assert!(get_info(&conn, "estacionamento").unwrap().is_none());
    }

    #[test]
    fn test_specialty_match_is_case_insensitive_substring() {
        let conn = setup_db();
        let slots = list_available_slots(&conn, "cardio").unwrap();
        assert_eq!(slots.len(), 3);
        // Ordered by start time; same-time slots keep insertion order.
        assert_eq!(slots[0].start_datetime, "2030-11-24 09:00:00");
    }

    #[test]
    fn test_book_flips_slot_and_inserts_booking() {
        let mut conn = setup_db();
        let outcome = book_consultation(&mut conn, 1, "Norian Henrique", "chat-1").unwrap();
        assert_eq!(outcome, BookOutcome::Booked);

        let status: String = conn
            .query_row(
                "SELECT status FROM consultation_slots WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "booked");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM consultation_bookings WHERE slot_id = 1 AND status = 'confirmed'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_double_book_second_sees_taken() {
        let mut conn = setup_db();
        assert_eq!(
            book_consultation(&mut conn, 1, "Alice", "chat-1").unwrap(),
            BookOutcome::Booked
        );
        assert_eq!(
            book_consultation(&mut conn, 1, "Bob", "chat-2").unwrap(),
            BookOutcome::SlotTaken
        );

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM consultation_bookings WHERE slot_id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_book_missing_slot() {
        let mut conn = setup_db();
        assert_eq!(
            book_consultation(&mut conn, 999, "Alice", "chat-1").unwrap(),
            BookOutcome::SlotMissing
        );
    }

    #[test]
    fn test_cancel_requires_ownership() {
        let mut conn = setup_db();
        book_consultation(&mut conn, 1, "Alice", "chat-1").unwrap();
        let booking_id: i64 = conn
            .query_row("SELECT id FROM consultation_bookings", [], |row| row.get(0))
            .unwrap();

        assert_eq!(
            cancel_consultation(&mut conn, booking_id, "chat-2").unwrap(),
            CancelOutcome::NotFound
        );
        assert_eq!(
            cancel_consultation(&mut conn, booking_id, "chat-1").unwrap(),
            CancelOutcome::Cancelled
        );
    }

    #[test]
    fn test_cancel_restores_availability_and_rebooking_works() {
        let mut conn = setup_db();
        book_consultation(&mut conn, 1, "Alice", "chat-1").unwrap();
        let booking_id: i64 = conn
            .query_row("SELECT id FROM consultation_bookings", [], |row| row.get(0))
            .unwrap();

        cancel_consultation(&mut conn, booking_id, "chat-1").unwrap();

        let status: String = conn
            .query_row(
                "SELECT status FROM consultation_slots WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "available");

        assert_eq!(
            book_consultation(&mut conn, 1, "Bob", "chat-2").unwrap(),
            BookOutcome::Booked
        );
    }

    #[test]
    fn test_cancel_twice_reports_current_status() {
        let mut conn = setup_db();
        book_consultation(&mut conn, 1, "Alice", "chat-1").unwrap();
        let booking_id: i64 = conn
            .query_row("SELECT id FROM consultation_bookings", [], |row| row.get(0))
            .unwrap();

        cancel_consultation(&mut conn, booking_id, "chat-1").unwrap();
        assert_eq!(
            cancel_consultation(&mut conn, booking_id, "chat-1").unwrap(),
            CancelOutcome::WrongStatus("cancelled".to_string())
        );
    }

    #[test]
    fn test_own_bookings_only_future_confirmed() {
        let mut conn = setup_db();
        // A slot in the past should never be listed.
        conn.execute_batch(
            "INSERT INTO consultation_slots (id, staff_id, start_datetime, status)
             VALUES (50, 1, '2001-01-01 09:00:00', 'available');",
        )
        .unwrap();
        book_consultation(&mut conn, 50, "Alice", "chat-1").unwrap();
        book_consultation(&mut conn, 1, "Alice", "chat-1").unwrap();

        let bookings = list_own_bookings(&conn, "chat-1", &now_string()).unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].start_datetime, "2030-11-24 09:00:00");

        assert!(list_own_bookings(&conn, "chat-9", &now_string())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_exam_types_alphabetical() {
        let conn = setup_db();
        let names = list_exam_types(&conn).unwrap();
        assert_eq!(names, vec!["Eletrocardiograma", "Exame de Sangue", "Raio-X"]);
    }

    #[test]
    fn test_exam_booking_round_trip() {
        let mut conn = setup_db();
        assert_eq!(
            book_exam(&mut conn, 1, "Maria Souza", "chat-1").unwrap(),
            BookOutcome::Booked
        );
        assert_eq!(
            book_exam(&mut conn, 1, "Bob", "chat-2").unwrap(),
            BookOutcome::SlotTaken
        );

        let bookings = list_own_exam_bookings(&conn, "chat-1", &now_string()).unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].exam_name, "Exame de Sangue");

        assert_eq!(
            cancel_exam(&mut conn, bookings[0].id, "chat-2").unwrap(),
            CancelOutcome::NotFound
        );
        assert_eq!(
            cancel_exam(&mut conn, bookings[0].id, "chat-1").unwrap(),
            CancelOutcome::Cancelled
        );

        let status: String = conn
            .query_row("SELECT status FROM exam_slots WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(status, "available");
    }
}
