//! Command line and environment configuration.

use crate::policy::Role;
use crate::web::Settings;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "coursebookd")]
#[command(about = "Course management service: courses, evaluation weights and grades")]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "COURSEBOOK_LISTEN", default_value = "127.0.0.1:8000", global = true)]
    pub listen: SocketAddr,

    /// Directory holding coursebook.sqlite3
    #[arg(long, env = "COURSEBOOK_WORKSPACE", default_value = "./data", global = true)]
    pub workspace: PathBuf,

    /// Session lifetime in hours
    #[arg(long, env = "COURSEBOOK_SESSION_TTL_HOURS", default_value = "336", global = true)]
    pub session_ttl_hours: i64,

    /// Mark the session cookie Secure (serve over TLS)
    #[arg(long, env = "COURSEBOOK_SECURE_COOKIES", default_value = "false", global = true)]
    pub secure_cookies: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,
}

impl Config {
    pub fn settings(&self) -> Settings {
        Settings {
            session_ttl: chrono::Duration::hours(self.session_ttl_hours.max(1)),
            secure_cookies: self.secure_cookies,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create an account, e.g. the first superuser
    CreateUser {
        #[arg(long)]
        username: String,

        #[arg(long, env = "COURSEBOOK_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long, default_value = "")]
        first_name: String,

        #[arg(long, default_value = "")]
        last_name: String,

        /// student, instructor or department_head
        #[arg(long, value_parser = parse_role)]
        role: Option<Role>,

        #[arg(long)]
        superuser: bool,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = Role::ALL.iter().map(|r| r.as_str()).collect();
        format!("unknown role {:?}, expected one of {}", raw, known.join(", "))
    })
}
