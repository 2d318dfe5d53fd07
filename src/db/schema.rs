use anyhow::Context;
use rusqlite::Connection;

/// Creates the six scheduling tables. Idempotent; safe to run on every start.
pub fn create_tables(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS staff (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            specialty TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS consultation_slots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            staff_id INTEGER NOT NULL REFERENCES staff(id),
            start_datetime TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available'
        );

        CREATE TABLE IF NOT EXISTS exam_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS exam_slots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exam_type_id INTEGER NOT NULL REFERENCES exam_types(id),
            start_datetime TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available'
        );

        CREATE TABLE IF NOT EXISTS consultation_bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slot_id INTEGER NOT NULL REFERENCES consultation_slots(id),
            patient_name TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'confirmed'
        );

        CREATE TABLE IF NOT EXISTS exam_bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exam_slot_id INTEGER NOT NULL REFERENCES exam_slots(id),
            patient_name TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'confirmed'
        );",
    )
    .context("failed to create tables")?;

    Ok(())
}

/// Static clinic information shown by the info tool.
pub fn seed_clinic_info(conn: &Connection) -> anyhow::Result<()> {
    let info_data = [
        (
            "endereco",
            "Nosso endereço é Rua das Flores, 123 - Centro.",
        ),
        (
            "horario_funcionamento",
            "Atendemos de Segunda a Sexta, das 08:00 às 18:00.",
        ),
        (
            "convenios_aceitos",
            "Aceitamos os convênios Unimed, Bradesco Saúde e SulAmérica.",
        ),
    ];

    for (topic, value) in info_data {
        conn.execute(
            "INSERT OR IGNORE INTO info (topic, value) VALUES (?1, ?2)",
            rusqlite::params![topic, value],
        )
        .context("failed to seed clinic info")?;
    }

    Ok(())
}

/// Demo staff, slots and exam fixtures for local runs (SEED_DEMO_DATA=1)
/// and for tests.
pub fn seed_demo_data(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "INSERT OR IGNORE INTO staff (id, name, specialty) VALUES
            (1, 'Dra. Ana Silva', 'Cardiologia'),
            (2, 'Dr. Bruno Costa', 'Dermatologia'),
            (3, 'Dr. Carlos Dias', 'Cardiologia');

        INSERT OR IGNORE INTO consultation_slots (id, staff_id, start_datetime, status) VALUES
            (1, 1, '2030-11-24 09:00:00', 'available'),
            (2, 1, '2030-11-24 10:00:00', 'available'),
            (3, 2, '2030-11-25 14:00:00', 'available'),
            (4, 3, '2030-11-24 09:00:00', 'available');

        INSERT OR IGNORE INTO exam_types (id, name, description) VALUES
            (1, 'Exame de Sangue', 'Hemograma completo em jejum.'),
            (2, 'Eletrocardiograma', 'ECG de repouso.'),
            (3, 'Raio-X', 'Radiografia simples.');

        INSERT OR IGNORE INTO exam_slots (id, exam_type_id, start_datetime, status) VALUES
            (1, 1, '2030-11-26 07:00:00', 'available'),
            (2, 1, '2030-11-26 07:30:00', 'available'),
            (3, 2, '2030-11-27 08:00:00', 'available');",
    )
    .context("failed to seed demo data")?;

    Ok(())
}
