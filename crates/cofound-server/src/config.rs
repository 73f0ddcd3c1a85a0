use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(anyhow::anyhow!("Unknown STORE_BACKEND: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub jwt_secret: String,
    pub jwt_expires_in: i64,
    pub refresh_token_expires_in: i64,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub admin_emails: Vec<String>,
    pub require_email_verification: bool,
    pub verification_code_ttl: i64,
    pub symmetric_dedup: bool,
    pub silent_rejection: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow::anyhow!("{} must be a boolean, got {:?}", name, other)),
    }
}

pub fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok();
        let store = match env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) if database_url.is_some() => StoreBackend::Postgres,
            Err(_) => StoreBackend::Memory,
        };
        let port: u16 = var_or("PORT", "3000").parse().context("PORT")?;

        Ok(Self {
            store,
            database_url,
            snapshot_path: env::var("SNAPSHOT_PATH").ok().map(PathBuf::from),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_expires_in: var_or("JWT_EXPIRES_IN", "900") // 15 minutes
                .parse()
                .context("JWT_EXPIRES_IN")?,
            refresh_token_expires_in: var_or("REFRESH_TOKEN_EXPIRES_IN", "604800") // 7 days
                .parse()
                .context("REFRESH_TOKEN_EXPIRES_IN")?,
            port,
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "uploads")),
            public_base_url: var_or("PUBLIC_BASE_URL", &format!("http://localhost:{}", port))
                .trim_end_matches('/')
                .to_string(),
            admin_emails: parse_email_list(&var_or("ADMIN_EMAILS", "")),
            require_email_verification: parse_bool(
                "REQUIRE_EMAIL_VERIFICATION",
                &var_or("REQUIRE_EMAIL_VERIFICATION", "true"),
            )?,
            verification_code_ttl: var_or("VERIFICATION_CODE_TTL", "900")
                .parse()
                .context("VERIFICATION_CODE_TTL")?,
            symmetric_dedup: parse_bool("SYMMETRIC_DEDUP", &var_or("SYMMETRIC_DEDUP", "false"))?,
            silent_rejection: parse_bool("SILENT_REJECTION", &var_or("SILENT_REJECTION", "true"))?,
        })
    }

    /// Settings for tests and local experiments: memory store, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            store: StoreBackend::Memory,
            database_url: None,
            snapshot_path: None,
            jwt_secret: "test-secret".to_string(),
            jwt_expires_in: 900,
            refresh_token_expires_in: 604800,
            port: 0,
            upload_dir: PathBuf::from("uploads"),
            public_base_url: "http://localhost:3000".to_string(),
            admin_emails: vec!["admin@example.com".to_string()],
            require_email_verification: true,
            verification_code_ttl: 900,
            symmetric_dedup: false,
            silent_rejection: true,
        }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}
