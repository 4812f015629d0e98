use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Benchmark configuration, the settings that rarely change between benchmarks.
///
/// Read from a TOML file with [BenchConfig::from_file]. A leading `~` in any path is expanded to
/// the user's home directory.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    pub general: GeneralSettings,
    pub directories: Directories,
    pub files: Files,
    #[serde(default)]
    pub launcher: LauncherSettings,
    /// Written verbatim to [Files::launcher_settings_file], with the number of players replaced
    /// for each sweep point.
    #[serde(default)]
    pub launcher_settings: toml::Table,
    pub client_variables: VariableNames,
    pub server_variables: VariableNames,
    #[serde(default)]
    pub test: TestSettings,
    /// Optional build step run before every sweep point.
    pub build: Option<BuildSettings>,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralSettings {
    /// The game to launch.
    pub game: String,
    /// Sender name of the game logic in the message log. Defaults to [GeneralSettings::game].
    pub client_role: Option<String>,
    /// Overrides the detected machine description in the metrics.
    pub machine: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directories {
    /// Where stdout, stderr and build logs are written.
    pub log_dir: PathBuf,
    /// Where the metrics and message count CSV files are written.
    pub csv_dir: PathBuf,
    /// Where the server writes its message log.
    pub msg_log_dir: PathBuf,
    pub launcher_cwd: PathBuf,
    pub test_cwd: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Files {
    pub launcher_file: PathBuf,
    pub launcher_settings_file: PathBuf,
    /// File name of the message log inside [Directories::msg_log_dir].
    pub server_msg_file: PathBuf,
    pub client_var_file: PathBuf,
    pub server_var_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LauncherSettings {
    /// Program that runs the launcher file, looked up on `PATH` unless it is a path.
    #[serde(default = "default_launcher_program")]
    pub program: String,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            program: default_launcher_program(),
        }
    }
}

fn default_launcher_program() -> String {
    "node".to_string()
}

/// Names of the reliable messaging variables in a settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct VariableNames {
    pub reliable_var: String,
    pub retry_var: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            args: vec!["test".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// Format CPU times and memory for humans rather than as raw numbers.
    #[serde(default = "default_human_readable")]
    pub human_readable: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            human_readable: default_human_readable(),
        }
    }
}

fn default_human_readable() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BenchConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(config.expand_home())
    }

    fn expand_home(mut self) -> Self {
        for dir in [
            &mut self.directories.log_dir,
            &mut self.directories.csv_dir,
            &mut self.directories.msg_log_dir,
            &mut self.directories.launcher_cwd,
            &mut self.directories.test_cwd,
            &mut self.files.launcher_file,
            &mut self.files.launcher_settings_file,
            &mut self.files.client_var_file,
            &mut self.files.server_var_file,
        ] {
            *dir = expand_home(dir);
        }
        if let Some(build) = self.build.as_mut() {
            build.cwd = expand_home(&build.cwd);
        }
        self
    }

    /// The sender name identifying the game logic in the message log.
    pub fn client_role(&self) -> &str {
        self.general
            .client_role
            .as_deref()
            .unwrap_or(&self.general.game)
    }

    pub fn message_log_path(&self) -> PathBuf {
        self.directories.msg_log_dir.join(&self.files.server_msg_file)
    }
}

/// Name a benchmark output file, `benchmark_<id>_<suffix>.<ext>` inside `dir`.
pub fn benchmark_file(dir: &Path, benchmark_id: i64, suffix: &str, ext: &str) -> PathBuf {
    dir.join(format!("benchmark_{benchmark_id}_{suffix}.{ext}"))
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => {
            log::warn!("Cannot expand {} because HOME is not set", path.display());
            path.to_path_buf()
        }
    }
}
