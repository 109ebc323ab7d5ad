use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Which [`JobStore`](crate::jobs::JobStore) backend to use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStoreKind {
    /// One JSON file per job under `jobs_dir`.
    #[default]
    File,
    /// Process-local map; jobs are lost on exit.
    Memory,
}

/// Settings for the process-backed action executor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Kill an action after this many seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Captured stdout/stderr are truncated to this many bytes each.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_max_output_bytes() -> usize {
    256 * 1024
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Settings for background migration jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Script invoked once per application on a real (non-dry) run.
    #[serde(default = "default_runner_action")]
    pub action: String,
    /// Pause between phases, in milliseconds.
    #[serde(default)]
    pub phase_delay_ms: u64,
}

fn default_runner_action() -> String {
    "migrate_applications.sh".to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            action: default_runner_action(),
            phase_delay_ms: 0,
        }
    }
}

/// Top-level configuration loaded from `config.yaml`.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding the maintenance shell scripts.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Directory holding `migration_state.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Job records directory. Defaults to `<state_dir>/jobs`.
    #[serde(default)]
    pub jobs_dir: Option<PathBuf>,
    /// Operator log directory.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    #[serde(default)]
    pub job_store: JobStoreKind,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Volume names reported by `check_disk_status`.
    #[serde(default = "default_disks")]
    pub disks: Vec<String>,
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_disks() -> Vec<String> {
    vec!["BLACK2T".to_string(), "8TbSeries".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scripts_dir: default_scripts_dir(),
            state_dir: default_state_dir(),
            jobs_dir: None,
            logs_dir: default_logs_dir(),
            job_store: JobStoreKind::default(),
            executor: ExecutorConfig::default(),
            runner: RunnerConfig::default(),
            disks: default_disks(),
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file.
    ///
    /// Falls back to `<path>.bak` when the file is missing.  When neither
    /// exists and `allow_missing` is set, the defaults are used.  Relative
    /// directories are resolved against [`assistant_home`](crate::assistant_home).
    pub async fn load(path: &Path, allow_missing: bool) -> anyhow::Result<Config> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => Some(c),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut bak_name = path.as_os_str().to_os_string();
                bak_name.push(".bak");
                let bak_path = PathBuf::from(bak_name);
                match tokio::fs::read_to_string(&bak_path).await {
                    Ok(c) => {
                        tracing::warn!(
                            path = %path.display(),
                            bak = %bak_path.display(),
                            "config file not found, falling back to .bak"
                        );
                        Some(c)
                    }
                    Err(_) if allow_missing => {
                        tracing::debug!(path = %path.display(), "no config file, using defaults");
                        None
                    }
                    Err(_) => {
                        return Err(e).with_context(|| {
                            format!("failed to read config file: {}", path.display())
                        });
                    }
                }
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };

        let mut config = match contents {
            Some(c) => Self::parse(&c)?,
            None => Config::default(),
        };
        config.resolve_relative(&crate::assistant_home());

        tracing::debug!(
            scripts = %config.scripts_dir.display(),
            jobs = %config.jobs_dir().display(),
            store = ?config.job_store,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Parse and validate YAML text.  Blank input yields the defaults.
    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents).context("failed to parse config YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    fn validate(&self) -> anyhow::Result<()> {
        if self.executor.timeout_secs == 0 {
            anyhow::bail!("config: executor.timeout_secs must be greater than 0");
        }
        if self.executor.max_output_bytes == 0 {
            anyhow::bail!("config: executor.max_output_bytes must be greater than 0");
        }
        if self.runner.action.trim().is_empty() {
            anyhow::bail!("config: runner.action must not be empty");
        }
        if self.disks.iter().any(|d| d.trim().is_empty()) {
            anyhow::bail!("config: disks must not contain empty names");
        }
        Ok(())
    }

    /// Make every relative directory absolute under `home`.
    pub fn resolve_relative(&mut self, home: &Path) {
        for dir in [&mut self.scripts_dir, &mut self.state_dir, &mut self.logs_dir] {
            if dir.is_relative() {
                *dir = home.join(&*dir);
            }
        }
        if let Some(jobs) = self.jobs_dir.as_mut() {
            if jobs.is_relative() {
                *jobs = home.join(&*jobs);
            }
        }
    }

    /// Effective job records directory.
    pub fn jobs_dir(&self) -> PathBuf {
        self.jobs_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("jobs"))
    }

    /// Path of the migration state file maintained by the scripts.
    pub fn migration_state_path(&self) -> PathBuf {
        self.state_dir.join("migration_state.json")
    }

    /// Serialize and write the configuration back to a YAML file.
    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_yaml::to_string(self).context("serialize config YAML")?;
        tokio::fs::write(path, &contents)
            .await
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}
