// Database access layer (SQLite via sqlx): registry tables and the checkin log.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Team {
    pub team_id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_date_unix: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub agent_uuid: String,
    pub team_id: i64,
    pub server_private_key: String,
    pub agent_public_key: String,
    pub created_date_unix: i64,
    pub root_date_unix: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Target {
    pub target_ipv4_address: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Checkin {
    pub checkin_id: i64,
    pub agent_uuid: String,
    pub target_ipv4_address: String,
    pub time_unix: i64,
}

/// One of the two latest checkins of a (team, target) pair.
/// `callback_order` is 1 for the most recent, 2 for the one before it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecentCheckin {
    pub team_id: i64,
    pub target_ipv4_address: String,
    pub value: i64,
    pub time_unix: i64,
    pub callback_order: i64,
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let in_memory = database_url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives only as long as its connection.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Teams (
                team_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_date_unix INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Agents (
                agent_uuid TEXT PRIMARY KEY,
                team_id INTEGER NOT NULL REFERENCES Teams(team_id),
                server_private_key TEXT NOT NULL UNIQUE,
                agent_public_key TEXT NOT NULL UNIQUE,
                created_date_unix INTEGER NOT NULL,
                root_date_unix INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS TargetsInScope (
                target_ipv4_address TEXT PRIMARY KEY,
                value INTEGER NOT NULL CHECK (value >= 1)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        // No foreign keys on the log: references are checked at intake time.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS AgentCheckins (
                checkin_id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_uuid TEXT NOT NULL,
                target_ipv4_address TEXT NOT NULL,
                time_unix INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkins_agent_time ON AgentCheckins (agent_uuid, time_unix)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Teams ─────────────────────────────────────────────────────────

    pub async fn create_team(
        &self,
        name: &str,
        password_hash: &str,
        now: i64,
    ) -> Result<Team, sqlx::Error> {
        let row = sqlx::query_as::<_, Team>(
            "INSERT INTO Teams (name, password_hash, created_date_unix) VALUES (?, ?, ?) RETURNING team_id, name, password_hash, created_date_unix",
        )
        .bind(name)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>, sqlx::Error> {
        let rows = sqlx::query_as::<_, Team>(
            "SELECT team_id, name, password_hash, created_date_unix FROM Teams ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_team(&self, team_id: i64) -> Result<Option<Team>, sqlx::Error> {
        let row = sqlx::query_as::<_, Team>(
            "SELECT team_id, name, password_hash, created_date_unix FROM Teams WHERE team_id = ?",
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ── Agents ────────────────────────────────────────────────────────

    pub async fn register_agent(
        &self,
        agent_uuid: &Uuid,
        team_id: i64,
        server_private_key: &str,
        agent_public_key: &str,
        now: i64,
    ) -> Result<Agent, sqlx::Error> {
        let row = sqlx::query_as::<_, Agent>(
            "INSERT INTO Agents (agent_uuid, team_id, server_private_key, agent_public_key, created_date_unix, root_date_unix) VALUES (?, ?, ?, ?, ?, 0) RETURNING agent_uuid, team_id, server_private_key, agent_public_key, created_date_unix, root_date_unix",
        )
        .bind(agent_uuid.to_string())
        .bind(team_id)
        .bind(server_private_key)
        .bind(agent_public_key)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_agent(&self, agent_uuid: &Uuid) -> Result<Option<Agent>, sqlx::Error> {
        let row = sqlx::query_as::<_, Agent>(
            "SELECT agent_uuid, team_id, server_private_key, agent_public_key, created_date_unix, root_date_unix FROM Agents WHERE agent_uuid = ?",
        )
        .bind(agent_uuid.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_agents(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM Agents")
            .fetch_one(&self.pool)
            .await
    }

    // ── Targets in scope ──────────────────────────────────────────────

    /// Returns false when the address was already in scope.
    pub async fn add_target(&self, address: Ipv4Addr, value: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO TargetsInScope (target_ipv4_address, value) VALUES (?, ?) ON CONFLICT (target_ipv4_address) DO NOTHING",
        )
        .bind(address.to_string())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_target(&self, address: Ipv4Addr) -> Result<Option<Target>, sqlx::Error> {
        let row = sqlx::query_as::<_, Target>(
            "SELECT target_ipv4_address, value FROM TargetsInScope WHERE target_ipv4_address = ?",
        )
        .bind(address.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_targets(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM TargetsInScope")
            .fetch_one(&self.pool)
            .await
    }

    // ── Checkin log ───────────────────────────────────────────────────

    pub async fn last_checkin_time(&self, agent_uuid: &Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT MAX(time_unix) FROM AgentCheckins WHERE agent_uuid = ?")
            .bind(agent_uuid.to_string())
            .fetch_one(&self.pool)
            .await
    }

    /// Append a checkin unless the agent already has one newer than
    /// `now - min_interval_secs`. Check and insert are a single statement,
    /// so two racing beacons from one agent cannot both land.
    pub async fn append_checkin_guarded(
        &self,
        agent_uuid: &Uuid,
        address: Ipv4Addr,
        now: i64,
        min_interval_secs: i64,
    ) -> Result<Option<Checkin>, sqlx::Error> {
        let agent_uuid = agent_uuid.to_string();
        let row = sqlx::query_as::<_, Checkin>(
            r#"
            INSERT INTO AgentCheckins (agent_uuid, target_ipv4_address, time_unix)
            SELECT ?, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM AgentCheckins WHERE agent_uuid = ? AND time_unix > ?
            )
            RETURNING checkin_id, agent_uuid, target_ipv4_address, time_unix
        "#,
        )
        .bind(&agent_uuid)
        .bind(address.to_string())
        .bind(now)
        .bind(&agent_uuid)
        .bind(now - min_interval_secs)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_checkins(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM AgentCheckins")
            .fetch_one(&self.pool)
            .await
    }

    /// The two most recent checkins of every (team, target) pair at or before
    /// `as_of`. Equal timestamps fall back to insertion order.
    pub async fn recent_checkins(&self, as_of: i64) -> Result<Vec<RecentCheckin>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RecentCheckin>(
            r#"
            SELECT team_id, target_ipv4_address, value, time_unix, callback_order
            FROM (
                SELECT a.team_id, c.target_ipv4_address, t.value, c.time_unix,
                       row_number() OVER (
                           PARTITION BY a.team_id, c.target_ipv4_address
                           ORDER BY c.time_unix DESC, c.checkin_id DESC
                       ) AS callback_order
                FROM AgentCheckins c
                JOIN Agents a ON a.agent_uuid = c.agent_uuid
                JOIN TargetsInScope t ON t.target_ipv4_address = c.target_ipv4_address
                WHERE c.time_unix <= ?
            )
            WHERE callback_order <= 2
            ORDER BY team_id, target_ipv4_address, callback_order
        "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
