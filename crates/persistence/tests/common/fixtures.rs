//! Test fixtures for the persistence layer.
//!
//! Eleven client records with a known mix of values and nulls, the table
//! definitions that hold them, and a deterministic id generator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mercator_persistence::core::{IdGenerator, RecordStorage};
use mercator_persistence::types::{FieldType, Record, RecordInput, RecordShape, parse_timestamp};
use mercator_persistence::{CallContext, Repository, RepositoryConfig};

/// Entity name used in every fixture repository.
pub const CLIENT_ENTITY: &str = "client";

/// Generates `client-001`, `client-002`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("client-{:03}", n)
    }
}

/// Formats the id the `n`th fixture receives.
pub fn client_id(n: u32) -> String {
    format!("client-{:03}", n)
}

/// SQLite table for the client fixtures.
pub fn clients_sqlite_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {} (
            id TEXT PRIMARY KEY,
            active BOOLEAN NOT NULL DEFAULT 1,
            date_created TEXT NOT NULL,
            date_modified TEXT NOT NULL,
            name TEXT,
            email TEXT,
            tier TEXT,
            priority REAL,
            verified BOOLEAN,
            due_at TIMESTAMP
        )",
        table
    )
}

/// PostgreSQL table for the client fixtures. Some columns use types that
/// need casts so the translator's cast paths are exercised.
pub fn clients_postgres_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {} (
            id TEXT PRIMARY KEY,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            date_created TIMESTAMPTZ NOT NULL,
            date_modified TIMESTAMPTZ NOT NULL,
            name TEXT,
            email VARCHAR(255),
            tier TEXT,
            priority INTEGER,
            verified BOOLEAN,
            due_at TIMESTAMPTZ
        )",
        table
    )
}

/// Declared shape of a client, used by the memory backend.
pub fn client_shape() -> RecordShape {
    RecordShape::new(CLIENT_ENTITY)
        .with_field("name", FieldType::String)
        .with_field("email", FieldType::String)
        .with_field("tier", FieldType::String)
        .with_field("priority", FieldType::Number)
        .with_field("verified", FieldType::Bool)
        .with_field("dueAt", FieldType::Timestamp)
}

/// Repository over `storage` with sequential ids.
pub fn client_repository(storage: Arc<dyn RecordStorage>, table: &str) -> Repository {
    let config = RepositoryConfig::new(CLIENT_ENTITY, table)
        .expect("valid repository config")
        .with_shape(client_shape());
    Repository::new(config, storage).with_id_generator(Arc::new(SequentialIds::default()))
}

/// One client fixture.
#[derive(Debug, Clone, Copy)]
pub struct ClientFixture {
    pub name: &'static str,
    pub email: &'static str,
    pub tier: &'static str,
    pub priority: Option<f64>,
    pub verified: bool,
    pub due_at: Option<&'static str>,
}

impl ClientFixture {
    /// Builds the create input.
    pub fn input(&self) -> RecordInput {
        let mut input = RecordInput::new()
            .with_field("name", self.name)
            .with_field("email", self.email)
            .with_field("tier", self.tier)
            .with_field("verified", self.verified);
        if let Some(priority) = self.priority {
            input = input.with_field("priority", priority);
        }
        if let Some(due_at) = self.due_at {
            let ts = parse_timestamp(due_at).expect("valid fixture timestamp");
            input = input.with_field("dueAt", ts);
        }
        input
    }
}

const fn client(
    name: &'static str,
    email: &'static str,
    tier: &'static str,
    priority: Option<f64>,
    verified: bool,
    due_at: Option<&'static str>,
) -> ClientFixture {
    ClientFixture {
        name,
        email,
        tier,
        priority,
        verified,
        due_at,
    }
}

/// The fixtures, in creation order. `client-005` has no priority; four
/// clients have no due date.
pub const CLIENTS: [ClientFixture; 11] = [
    client("Joe's Diner", "joe@diner.test", "gold", Some(10.0), true, Some("2024-01-05T00:00:00Z")),
    client("Acme Corp", "acme@corp.test", "silver", Some(15.0), false, Some("2024-02-10T00:00:00Z")),
    client("Zoe Bakery", "zoe@bakery.test", "gold", Some(12.0), true, None),
    client("Moe's Tavern", "moe@tavern.test", "bronze", Some(5.0), true, Some("2024-03-01T00:00:00Z")),
    client("Globex", "globex@corp.test", "silver", None, false, Some("2024-01-20T00:00:00Z")),
    client("Initech", "initech@corp.test", "bronze", Some(20.0), true, None),
    client("Umbrella", "umbrella@corp.test", "gold", Some(15.0), false, Some("2024-04-15T00:00:00Z")),
    client("Hooli", "hooli@tech.test", "silver", Some(8.0), true, None),
    client("Stark Industries", "stark@ind.test", "gold", Some(30.0), true, Some("2024-05-01T00:00:00Z")),
    client("Wayne Enterprises", "wayne@ent.test", "gold", Some(25.0), false, None),
    client("Soylent", "soylent@corp.test", "bronze", Some(11.0), false, Some("2024-02-28T00:00:00Z")),
];

/// Creates every fixture through `repo`, in order.
pub async fn seed_clients(repo: &Repository, ctx: &CallContext) -> Vec<Record> {
    let mut created = Vec::with_capacity(CLIENTS.len());
    for fixture in &CLIENTS {
        created.push(
            repo.create(ctx, fixture.input())
                .await
                .expect("failed to seed client"),
        );
    }
    created
}
