// Registry administration: team and agent registration.

use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{hash_password, names_too_similar, MAX_TEAM_NAME_LEN};
use crate::db::{Agent, Database, Team};

/// Bytes of entropy in each placeholder agent key.
const PLACEHOLDER_KEY_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("team name must not be empty")]
    EmptyTeamName,
    #[error("team name exceeds {} characters", MAX_TEAM_NAME_LEN)]
    TeamNameTooLong,
    #[error("team name {name:?} is too similar to existing team {existing:?}")]
    TeamNameTooSimilar { name: String, existing: String },
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("password hashing failed: {0}")]
    Credential(String),
    #[error("invalid agent uuid {0:?}")]
    InvalidAgentUuid(String),
    #[error("team {0} does not exist")]
    UnknownTeam(i64),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

/// Create a team. The name is trimmed; look-alike names are refused.
pub async fn register_team(
    db: &Database,
    name: &str,
    password: &str,
    now: i64,
) -> Result<Team, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyTeamName);
    }
    if name.chars().count() > MAX_TEAM_NAME_LEN {
        return Err(RegistryError::TeamNameTooLong);
    }
    if password.is_empty() {
        return Err(RegistryError::EmptyPassword);
    }

    for team in db.list_teams().await? {
        if names_too_similar(name, &team.name) {
            return Err(RegistryError::TeamNameTooSimilar {
                name: name.to_string(),
                existing: team.name,
            });
        }
    }

    let password_hash = hash_password(password).map_err(RegistryError::Credential)?;
    let team = db.create_team(name, &password_hash, now).await?;

    tracing::info!(team_id = team.team_id, name = %team.name, "Team registered");
    Ok(team)
}

/// Bind a new agent UUID to an existing team with fresh placeholder keys.
pub async fn register_agent(
    db: &Database,
    agent_uuid: &str,
    team_id: i64,
    now: i64,
) -> Result<Agent, RegistryError> {
    let uuid = Uuid::parse_str(agent_uuid.trim())
        .map_err(|_| RegistryError::InvalidAgentUuid(agent_uuid.to_string()))?;

    if db.get_team(team_id).await?.is_none() {
        return Err(RegistryError::UnknownTeam(team_id));
    }

    let server_private_key = placeholder_key();
    let agent_public_key = placeholder_key();
    let agent = db
        .register_agent(&uuid, team_id, &server_private_key, &agent_public_key, now)
        .await?;

    tracing::info!(agent = %agent.agent_uuid, team_id, "Agent registered");
    Ok(agent)
}

fn placeholder_key() -> String {
    let mut bytes = [0u8; PLACEHOLDER_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
