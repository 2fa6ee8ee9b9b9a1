use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::text::normalize_name;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Clerk,
}

/// Hosted key-value table the browser register writes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_remote_table")]
    pub table: String,
}

pub fn default_remote_table() -> String {
    "settlement_entries".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub operator_id: Uuid,

    /// Human-facing operator name recorded on created entries.
    ///
    /// If missing (older configs), it is auto-filled from `operator_id`.
    #[serde(default)]
    pub operator_name: Option<String>,

    #[serde(default)]
    pub role: Role,

    /// Office whose register is open; each office has its own database.
    pub current_office: String,

    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Timestamp of the last successful pull from the remote table.
    #[serde(default)]
    pub last_pull_at: Option<DateTime<Utc>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let operator_id = Uuid::new_v4();
        Self {
            operator_id,
            operator_name: Some(default_operator_name(operator_id)),
            role: Role::Clerk,
            current_office: "default".to_string(),
            remote: None,
            last_pull_at: None,
        }
    }
}

impl AppConfig {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn operator_label(&self) -> String {
        self.operator_name
            .clone()
            .unwrap_or_else(|| default_operator_name(self.operator_id))
    }
}

pub fn default_operator_name(id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("operator-{}", &simple[..8])
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// Resolves where config and registers live. `home` (from `--home` or
/// `AUDITREG_HOME`) keeps everything under one directory.
pub fn app_paths(home: Option<PathBuf>) -> Result<AppPaths> {
    let (config_dir, data_dir) = match home {
        Some(root) => (root.join("config"), root.join("data")),
        None => {
            let dirs = ProjectDirs::from("bd", "auditreg", "auditreg")
                .context("Could not determine the platform config/data directories")?;
            (dirs.config_dir().to_path_buf(), dirs.data_dir().to_path_buf())
        }
    };
    Ok(AppPaths {
        config_dir,
        data_dir,
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir).with_context(|| {
        format!("Could not create config directory {}", paths.config_dir.display())
    })?;
    let cfg_path = paths.config_dir.join("config.json");

    let raw = match fs::read_to_string(&cfg_path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let cfg = AppConfig::default();
            write_config(&cfg_path, &cfg)?;
            tracing::info!(path = %cfg_path.display(), "initialized config");
            return Ok((cfg, cfg_path));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Could not read {}", cfg_path.display()));
        }
    };

    let mut cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid config file", cfg_path.display()))?;

    // Configs written before operator names existed.
    if cfg.operator_name.is_none() {
        cfg.operator_name = Some(default_operator_name(cfg.operator_id));
        write_config(&cfg_path, &cfg)?;
    }

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let body = serde_json::to_string_pretty(cfg)?;
    fs::write(path, body).with_context(|| format!("Could not write {}", path.display()))
}

/// Directory-safe form of an office name. Non-ASCII text (Bengali letters,
/// vowel signs, virama) is kept so distinct offices get distinct directories.
pub fn office_slug(name: &str) -> String {
    let name = normalize_name(name);
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        let keep = if ch.is_alphanumeric() || ch == '_' || !(ch.is_ascii() || ch.is_whitespace()) {
            Some(ch.to_lowercase().next().unwrap_or(ch))
        } else if ch.is_whitespace() || matches!(ch, '-' | ':' | '/' | '\\' | '.') {
            Some('-')
        } else {
            None
        };
        match keep {
            Some('-') if slug.is_empty() || slug.ends_with('-') => {}
            Some(c) => slug.push(c),
            None => {}
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "office".to_string()
    } else {
        slug
    }
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
