#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const MEDIA_ROOT_KEY: &str = "MEDIA_ROOT";
pub const HOST_KEY: &str = "CHAPTERFEED_HOST";
pub const PORT_KEY: &str = "CHAPTERFEED_PORT";
pub const PUBLIC_URL_KEY: &str = "CHAPTERFEED_PUBLIC_URL";
pub const AI_ENABLED_KEY: &str = "CHAPTERFEED_AI_ENABLED";
pub const API_TOKENS_KEY: &str = "CHAPTERFEED_API_TOKENS";

/// Optional capabilities, resolved once at startup and handed to the
/// services that care about them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub ai_chapter_detection: bool,
}

impl FeatureFlags {
    pub fn with_ai(ai_chapter_detection: bool) -> Self {
        Self {
            ai_chapter_detection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub media_root: PathBuf,
    pub host: String,
    pub port: u16,
    /// Base URL the blob store prefixes to object keys.
    pub public_url: String,
    pub features: FeatureFlags,
    /// Bearer token -> user id.
    pub api_tokens: HashMap<String, String>,
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    resolve_runtime_config(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub media_root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub ai_enabled: Option<bool>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config(&file_vars, env_var_string, overrides)
}

fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let media_root = overrides
        .media_root
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value(MEDIA_ROOT_KEY, file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("{MEDIA_ROOT_KEY} not set"))?;
    let port = overrides
        .port
        .or_else(|| {
            lookup_value(PORT_KEY, file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value(HOST_KEY, file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let public_url = overrides
        .public_url
        .or_else(|| lookup_value(PUBLIC_URL_KEY, file_vars, &env_lookup))
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| format!("http://{host}:{port}"));
    let ai_chapter_detection = overrides.ai_enabled.unwrap_or_else(|| {
        lookup_value(AI_ENABLED_KEY, file_vars, &env_lookup)
            .map(|value| parse_flag(&value))
            .unwrap_or(false)
    });
    let api_tokens = lookup_value(API_TOKENS_KEY, file_vars, &env_lookup)
        .map(|raw| parse_token_table(&raw))
        .transpose()?
        .unwrap_or_default();

    Ok(RuntimeConfig {
        media_root: PathBuf::from(media_root),
        host,
        port,
        public_url,
        features: FeatureFlags::with_ai(ai_chapter_detection),
        api_tokens,
    })
}

/// Only the literal `true` (any case) turns a flag on.
fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Parses `token=user_id` pairs separated by commas.
fn parse_token_table(raw: &str) -> Result<HashMap<String, String>> {
    let mut tokens = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (token, user_id) = entry
            .split_once('=')
            .with_context(|| format!("{API_TOKENS_KEY} entry `{entry}` is not token=user_id"))?;
        let (token, user_id) = (token.trim(), user_id.trim());
        if token.is_empty() || user_id.is_empty() {
            return Err(anyhow!("{API_TOKENS_KEY} entry `{entry}` has an empty side"));
        }
        tokens.insert(token.to_string(), user_id.to_string());
    }
    Ok(tokens)
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
