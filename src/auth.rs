// Team credentials: password hashing and team name rules.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};

pub const MAX_TEAM_NAME_LEN: usize = 64;

// ── Password hashing ─────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| format!("Failed to hash password: {e}"))
}

// ── Team names ───────────────────────────────────────────────────────

/// Canonical form used to detect look-alike team names: ASCII
/// alphanumerics only, lowercased.
pub fn canonical_team_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// True when two names collapse to the same canonical form,
/// e.g. "Red Team" and "red_team".
pub fn names_too_similar(a: &str, b: &str) -> bool {
    canonical_team_name(a) == canonical_team_name(b)
}
