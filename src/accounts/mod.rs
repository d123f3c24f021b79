//! Identities, their single role record, and login sessions.

pub mod password;
pub mod session;

use crate::db::{is_unique_violation, now_rfc3339};
use crate::error::{AppError, AppResult};
use crate::policy::Role;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

const USERNAME_MAX_LEN: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    /// `None` when the profile row is missing.
    pub role: Option<Role>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    /// Defaults to student.
    pub role: Option<Role>,
}

const IDENTITY_SELECT: &str = "SELECT u.id, u.username, u.first_name, u.last_name, u.is_superuser, p.role
     FROM users u
     LEFT JOIN profiles p ON p.user_id = u.id";

fn identity_from_row(r: &Row<'_>) -> rusqlite::Result<Identity> {
    let role: Option<String> = r.get(5)?;
    Ok(Identity {
        id: r.get(0)?,
        username: r.get(1)?,
        first_name: r.get(2)?,
        last_name: r.get(3)?,
        is_superuser: r.get::<_, i64>(4)? != 0,
        role: role.as_deref().and_then(Role::parse),
    })
}

/// A validated [`NewIdentity`] whose password is already hashed. Hashing
/// is slow, so it happens before any database lock is taken.
#[derive(Debug, Clone)]
pub struct PreparedIdentity {
    username: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    is_superuser: bool,
    role: Role,
}

impl NewIdentity {
    pub fn prepare(&self) -> AppResult<PreparedIdentity> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(AppError::validation("bad_params", "username must not be empty"));
        }
        if username.chars().count() > USERNAME_MAX_LEN {
            return Err(AppError::validation(
                "bad_params",
                format!("username must be at most {} characters", USERNAME_MAX_LEN),
            ));
        }
        if self.password.is_empty() {
            return Err(AppError::validation("bad_params", "password must not be empty"));
        }
        Ok(PreparedIdentity {
            username: username.to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            password_hash: password::hash_password(&self.password)?,
            is_superuser: self.is_superuser,
            role: self.role.unwrap_or_default(),
        })
    }
}

/// Creates the user and its profile row together.
pub fn insert_identity(conn: &Connection, new: &PreparedIdentity) -> AppResult<Identity> {
    let user_id = Uuid::new_v4().to_string();

    let tx = conn.unchecked_transaction()?;
    if let Err(e) = tx.execute(
        "INSERT INTO users(id, username, first_name, last_name, password_hash, is_superuser, date_joined)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            &new.username,
            &new.first_name,
            &new.last_name,
            &new.password_hash,
            new.is_superuser as i64,
            now_rfc3339(),
        ),
    ) {
        if is_unique_violation(&e) {
            return Err(AppError::validation(
                "duplicate_username",
                format!("a user with username {} already exists", new.username),
            ));
        }
        return Err(e.into());
    }
    tx.execute(
        "INSERT INTO profiles(user_id, role) VALUES(?, ?)",
        (&user_id, new.role.as_str()),
    )?;
    tx.commit()?;

    tracing::info!(user = %new.username, role = %new.role, "created identity");
    Ok(Identity {
        id: user_id,
        username: new.username.clone(),
        first_name: new.first_name.clone(),
        last_name: new.last_name.clone(),
        is_superuser: new.is_superuser,
        role: Some(new.role),
    })
}

pub fn create_identity(conn: &Connection, new: &NewIdentity) -> AppResult<Identity> {
    insert_identity(conn, &new.prepare()?)
}

pub fn find_identity(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<Identity>> {
    conn.query_row(
        &format!("{} WHERE u.id = ?", IDENTITY_SELECT),
        [user_id],
        identity_from_row,
    )
    .optional()
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<Identity>> {
    conn.query_row(
        &format!("{} WHERE u.username = ?", IDENTITY_SELECT),
        [username.trim()],
        identity_from_row,
    )
    .optional()
}

/// Every identity, ordered by last name, first name, username.
pub fn list_identities(conn: &Connection) -> rusqlite::Result<Vec<Identity>> {
    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY u.last_name, u.first_name, u.username",
        IDENTITY_SELECT
    ))?;
    let rows = stmt
        .query_map([], identity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_with_role(conn: &Connection, role: Role) -> rusqlite::Result<Vec<Identity>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE p.role = ? ORDER BY u.last_name, u.first_name, u.username",
        IDENTITY_SELECT
    ))?;
    let rows = stmt
        .query_map([role.as_str()], identity_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_with_role(conn: &Connection, role: Role) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = ?",
        [role.as_str()],
        |r| r.get(0),
    )
}

/// Upserts the profile row. This is also how a user that lost its profile
/// gets a role again.
pub fn set_role(conn: &Connection, user_id: &str, role: Role) -> AppResult<Identity> {
    if find_identity(conn, user_id)?.is_none() {
        return Err(AppError::NotFound("user"));
    }
    conn.execute(
        "INSERT INTO profiles(user_id, role) VALUES(?, ?)
         ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
        (user_id, role.as_str()),
    )?;
    let identity = find_identity(conn, user_id)?.ok_or(AppError::NotFound("user"))?;
    tracing::info!(user = %identity.username, role = %role, "role changed");
    Ok(identity)
}

/// The stored hash for a username, looked up so it can be checked
/// without holding the connection.
#[derive(Debug, Clone)]
pub struct StoredCredentials {
    pub user_id: String,
    password_hash: String,
}

impl StoredCredentials {
    pub fn verify(&self, password: &str) -> AppResult<bool> {
        Ok(password::verify_password(password, &self.password_hash)?)
    }
}

pub fn credentials_for(conn: &Connection, username: &str) -> rusqlite::Result<Option<StoredCredentials>> {
    conn.query_row(
        "SELECT id, password_hash FROM users WHERE username = ?",
        [username.trim()],
        |r| {
            Ok(StoredCredentials {
                user_id: r.get(0)?,
                password_hash: r.get(1)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db;

    fn new_identity(username: &str) -> NewIdentity {
        NewIdentity {
            username: username.to_string(),
            password: "pw".to_string(),
            ..NewIdentity::default()
        }
    }

    #[test]
    fn new_identity_gets_exactly_one_student_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");

        let created = create_identity(&conn, &new_identity("ayse")).expect("create");
        assert_eq!(created.role, Some(Role::Student));

        let profile_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM profiles WHERE user_id = ?",
                [&created.id],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(profile_rows, 1);

        let loaded = find_identity(&conn, &created.id).expect("find").expect("exists");
        assert_eq!(loaded, created);
    }

    #[test]
    fn duplicate_username_is_a_validation_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        create_identity(&conn, &new_identity("mehmet")).expect("first");
        let err = create_identity(&conn, &new_identity("mehmet")).expect_err("second");
        assert!(err.is_validation());
    }

    #[test]
    fn set_role_restores_missing_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        let id = create_identity(&conn, &new_identity("zeynep")).expect("create");
        conn.execute("DELETE FROM profiles WHERE user_id = ?", [&id.id])
            .expect("drop profile");
        assert_eq!(find_identity(&conn, &id.id).expect("find").expect("row").role, None);

        let updated = set_role(&conn, &id.id, Role::Instructor).expect("set role");
        assert_eq!(updated.role, Some(Role::Instructor));
    }

    #[test]
    fn stored_credentials_check_password() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");
        let ali = create_identity(&conn, &new_identity("ali")).expect("create");

        let creds = credentials_for(&conn, " ali ").expect("lookup").expect("ali");
        assert_eq!(creds.user_id, ali.id);
        assert!(creds.verify("pw").expect("verify"));
        assert!(!creds.verify("nope").expect("verify"));
        assert!(credentials_for(&conn, "nobody").expect("lookup").is_none());
    }

    #[test]
    fn prepared_identity_is_validated_and_hashed_before_insert() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open");

        assert!(new_identity("  ").prepare().expect_err("blank").is_validation());
        let prepared = new_identity(" elif ").prepare().expect("prepare");
        let elif = insert_identity(&conn, &prepared).expect("insert");
        assert_eq!(elif.username, "elif");

        let stored: String = conn
            .query_row("SELECT password_hash FROM users WHERE id = ?", [&elif.id], |r| r.get(0))
            .expect("hash");
        assert!(stored.starts_with("$argon2"));
        assert!(insert_identity(&conn, &prepared).expect_err("dup").is_validation());
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut id = Identity {
            id: "1".into(),
            username: "hoca".into(),
            first_name: String::new(),
            last_name: String::new(),
            is_superuser: false,
            role: Some(Role::Instructor),
        };
        assert_eq!(id.display_name(), "hoca");
        id.first_name = "Barış".into();
        id.last_name = "Yılmaz".into();
        assert_eq!(id.display_name(), "Barış Yılmaz");
    }
}
