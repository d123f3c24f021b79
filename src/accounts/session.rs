use crate::db::now_rfc3339;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "sessionid";

pub fn create_session(conn: &Connection, user_id: &str, ttl: Duration) -> rusqlite::Result<String> {
    let token = Uuid::new_v4().simple().to_string();
    let expires_at = (Utc::now() + ttl).to_rfc3339();
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (&token, user_id, now_rfc3339(), &expires_at),
    )?;
    Ok(token)
}

/// User id behind a live session token. Expired rows are removed on sight.
pub fn resolve_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<String>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token = ?",
            [token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((user_id, expires_at)) = row else {
        return Ok(None);
    };

    let live = DateTime::parse_from_rfc3339(&expires_at)
        .map(|t| t.with_timezone(&Utc) > Utc::now())
        .unwrap_or(false);
    if !live {
        delete_session(conn, token)?;
        return Ok(None);
    }
    Ok(Some(user_id))
}

pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

/// Value of the session cookie in a raw `Cookie` header, if present.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

pub fn set_cookie_value(token: &str, ttl: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_cookie_value() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}
