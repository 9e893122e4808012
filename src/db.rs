// src/db.rs - Database setup and schema migrations

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Account tables, one per role
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hospitals (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            phone TEXT NOT NULL,
            city TEXT NOT NULL CHECK(length(city) > 0 AND length(city) <= 100),
            location TEXT NOT NULL DEFAULT '',
            total_patients INTEGER NOT NULL DEFAULT 0 CHECK(total_patients >= 0),
            emergencies_created INTEGER NOT NULL DEFAULT 0 CHECK(emergencies_created >= 0),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blood_banks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            phone TEXT NOT NULL,
            city TEXT NOT NULL CHECK(length(city) > 0 AND length(city) <= 100),
            location TEXT NOT NULL DEFAULT '',
            total_stock INTEGER NOT NULL DEFAULT 0 CHECK(total_stock >= 0),
            total_dispatched INTEGER NOT NULL DEFAULT 0 CHECK(total_dispatched >= 0),
            successful_sends INTEGER NOT NULL DEFAULT 0 CHECK(successful_sends >= 0),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            phone TEXT NOT NULL,
            city TEXT NOT NULL CHECK(length(city) > 0 AND length(city) <= 100),
            location TEXT NOT NULL DEFAULT '',
            blood_group TEXT NOT NULL CHECK(
                blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            total_pledges INTEGER NOT NULL DEFAULT 0 CHECK(total_pledges >= 0),
            reputation INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patient_users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            phone TEXT NOT NULL,
            city TEXT NOT NULL CHECK(length(city) > 0 AND length(city) <= 100),
            location TEXT NOT NULL DEFAULT '',
            blood_group TEXT NOT NULL CHECK(
                blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            age INTEGER NOT NULL CHECK(age >= 0 AND age <= 150),
            total_requests INTEGER NOT NULL DEFAULT 0 CHECK(total_requests >= 0),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Hospital-internal patients
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patients (
            id TEXT PRIMARY KEY,
            hospital_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            age INTEGER NOT NULL CHECK(age >= 0 AND age <= 150),
            blood_type TEXT NOT NULL CHECK(
                blood_type IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            units_needed INTEGER NOT NULL CHECK(units_needed >= 1),
            units_received INTEGER NOT NULL DEFAULT 0 CHECK(units_received >= 0),
            status TEXT NOT NULL DEFAULT 'Requesting' CHECK(
                status IN ('Requesting', 'Partial', 'Received')
            ),
            contact_phone TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (hospital_id) REFERENCES hospitals (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emergencies (
            id TEXT PRIMARY KEY,
            creator_kind TEXT NOT NULL CHECK(creator_kind IN ('hospital', 'bloodbank')),
            creator_id TEXT NOT NULL,
            creator_name TEXT NOT NULL,
            blood_type TEXT NOT NULL CHECK(
                blood_type IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            units_needed INTEGER NOT NULL CHECK(units_needed >= 1),
            units_pledged INTEGER NOT NULL DEFAULT 0 CHECK(units_pledged >= 0),
            units_received INTEGER NOT NULL DEFAULT 0 CHECK(units_received >= 0),
            city TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            contact_phone TEXT NOT NULL,
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            status TEXT NOT NULL DEFAULT 'Active' CHECK(
                status IN ('Active', 'Fulfilled', 'Cancelled')
            ),
            priority TEXT NOT NULL DEFAULT 'High' CHECK(
                priority IN ('Low', 'Medium', 'High', 'Critical')
            ),
            expires_at DATETIME NOT NULL,
            cancelled_at DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One response per donor per emergency, enforced by the store as well
    // as the coordinator
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emergency_responses (
            id TEXT PRIMARY KEY,
            emergency_id TEXT NOT NULL,
            donor_id TEXT NOT NULL,
            donor_name TEXT NOT NULL,
            units_pledged INTEGER NOT NULL CHECK(units_pledged >= 1),
            status TEXT NOT NULL DEFAULT 'Pledged' CHECK(
                status IN ('Pledged', 'Confirmed', 'Completed', 'Cancelled')
            ),
            responded_at DATETIME NOT NULL,
            UNIQUE(emergency_id, donor_id),
            FOREIGN KEY (emergency_id) REFERENCES emergencies (id),
            FOREIGN KEY (donor_id) REFERENCES donors (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blood_requests (
            id TEXT PRIMARY KEY,
            patient_id TEXT NOT NULL,
            patient_name TEXT NOT NULL,
            age INTEGER NOT NULL CHECK(age >= 0 AND age <= 150),
            blood_group TEXT NOT NULL CHECK(
                blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            units_needed INTEGER NOT NULL CHECK(units_needed >= 1),
            phone TEXT NOT NULL,
            city TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            urgency_level TEXT NOT NULL DEFAULT 'Medium' CHECK(
                urgency_level IN ('Low', 'Medium', 'High', 'Critical')
            ),
            status TEXT NOT NULL DEFAULT 'Pending' CHECK(
                status IN ('Pending', 'Accepted', 'Fulfilled', 'Cancelled')
            ),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            accepted_by_id TEXT,
            accepted_by_name TEXT,
            accepted_at DATETIME,
            cancelled_at DATETIME,
            cancellation_reason TEXT,
            fulfilled_at DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (patient_id) REFERENCES patient_users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blood_request_responses (
            id TEXT PRIMARY KEY,
            request_id TEXT NOT NULL,
            blood_bank_id TEXT NOT NULL,
            blood_bank_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('Interested', 'Accepted', 'Declined')),
            message TEXT CHECK(message IS NULL OR length(message) <= 500),
            responded_at DATETIME NOT NULL,
            UNIQUE(request_id, blood_bank_id),
            FOREIGN KEY (request_id) REFERENCES blood_requests (id),
            FOREIGN KEY (blood_bank_id) REFERENCES blood_banks (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS preservations (
            id TEXT PRIMARY KEY,
            blood_bank_id TEXT NOT NULL,
            batch_id TEXT NOT NULL UNIQUE,
            blood_type TEXT NOT NULL CHECK(
                blood_type IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            units INTEGER NOT NULL CHECK(units >= 0),
            collection_date DATETIME NOT NULL,
            expiry_date DATETIME NOT NULL,
            status TEXT NOT NULL DEFAULT 'Available' CHECK(
                status IN ('Available', 'Reserved', 'Dispatched', 'Expired')
            ),
            storage_location TEXT CHECK(storage_location IS NULL OR length(storage_location) <= 255),
            donor_info TEXT CHECK(donor_info IS NULL OR length(donor_info) <= 500),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (blood_bank_id) REFERENCES blood_banks (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS send_records (
            id TEXT PRIMARY KEY,
            blood_bank_id TEXT NOT NULL,
            preservation_id TEXT NOT NULL,
            recipient_kind TEXT NOT NULL CHECK(recipient_kind IN ('hospital', 'bloodbank')),
            recipient_id TEXT NOT NULL,
            recipient_name TEXT NOT NULL,
            blood_type TEXT NOT NULL CHECK(
                blood_type IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')
            ),
            units INTEGER NOT NULL CHECK(units >= 1),
            dispatch_date DATETIME NOT NULL,
            expected_delivery DATETIME,
            actual_delivery DATETIME,
            status TEXT NOT NULL DEFAULT 'Pending' CHECK(
                status IN ('Pending', 'In Transit', 'Delivered', 'Failed')
            ),
            tracking_number TEXT NOT NULL UNIQUE,
            emergency_id TEXT,
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (blood_bank_id) REFERENCES blood_banks (id),
            FOREIGN KEY (preservation_id) REFERENCES preservations (id),
            FOREIGN KEY (emergency_id) REFERENCES emergencies (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Listing paths filter by city/status constantly
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emergencies_city_status ON emergencies (city, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emergencies_expires ON emergencies (expires_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_responses_emergency ON emergency_responses (emergency_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_blood_requests_city_status ON blood_requests (city, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_blood_requests_patient ON blood_requests (patient_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_preservations_bank ON preservations (blood_bank_id, status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_send_records_bank ON send_records (blood_bank_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_patients_hospital ON patients (hospital_id)")
        .execute(pool)
        .await?;

    Ok(())
}
