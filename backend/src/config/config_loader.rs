use anyhow::{Context, Result};

use super::{
    config_model::{Accounting, BackendServer, Database, DotEnvyConfig, Supabase},
    stage::Stage,
};

const DEFAULT_MAX_CONFLICT_ATTEMPTS: u32 = 5;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
    };

    let supabase = Supabase {
        jwt_secret: required("SUPABASE_JWT_SECRET")?,
    };

    let max_conflict_attempts = match std::env::var("ACCOUNTING_MAX_CONFLICT_ATTEMPTS") {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .context("ACCOUNTING_MAX_CONFLICT_ATTEMPTS is invalid")?,
        _ => DEFAULT_MAX_CONFLICT_ATTEMPTS,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        supabase,
        accounting: Accounting {
            max_conflict_attempts,
        },
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is missing"))
}
