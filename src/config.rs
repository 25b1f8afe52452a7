use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATABASE_PATH: &str = "data/tubeclone.db";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_BCRYPT_COST: u32 = 10;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Everything the binaries need to know before opening the database.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub jwt_secret: Option<String>,
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: u32,
}

impl Settings {
    /// The API cannot sign or check bearer tokens without a secret, so the
    /// backend refuses to start when it is absent. The seeder never asks.
    pub fn jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .ok_or_else(|| anyhow!("JWT_SECRET not set"))
    }
}

/// Values coming from command-line flags. They win over the environment and
/// the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub database_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(build_settings(&file_vars, env_var_string, overrides))
}

fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Settings {
    let lookup = |key: &str| env_lookup(key).or_else(|| file_vars.get(key).cloned());

    let database_path = overrides
        .database_path
        .or_else(|| lookup("DATABASE_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
    let jwt_secret = lookup("JWT_SECRET").filter(|secret| !secret.trim().is_empty());
    let port = overrides
        .port
        .or_else(|| {
            lookup("TUBECLONE_PORT")
                .or_else(|| lookup("PORT"))
                .and_then(|value| value.trim().parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup("TUBECLONE_HOST"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let bcrypt_cost = lookup("BCRYPT_COST")
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|cost| (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(cost))
        .unwrap_or(DEFAULT_BCRYPT_COST);

    Settings {
        database_path,
        jwt_secret,
        host,
        port,
        bcrypt_cost,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Reads `KEY=value` pairs from a dotenv-style file. A missing file is not an
/// error; the environment alone may carry the configuration.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let raw = raw.trim();
    let value = ['"', '\'']
        .iter()
        .find_map(|quote| raw.strip_prefix(*quote)?.strip_suffix(*quote))
        .unwrap_or(raw);
    Some((key.to_string(), value.to_string()))
}
