use std::path::{Path, PathBuf};

use anyhow::Context;
use regex::Regex;

use crate::config::{BenchConfig, VariableNames};

/// The launcher setting holding the number of simultaneous connections.
pub const NUM_PLAYERS_SETTING: &str = "numPlayers";

/// Writes the per sweep point settings of the system under test.
pub trait ConfigPatcher {
    fn set_connection_count(&mut self, connection_count: u32) -> anyhow::Result<()>;

    /// The timeout is written even when reliable messaging is off, it only takes effect when it is
    /// on.
    fn set_reliability(&mut self, reliable: bool, timeout_ms: u64) -> anyhow::Result<()>;
}

/// Patches the launcher settings file and the client and server variable files in place.
#[derive(Debug, Clone)]
pub struct SettingsPatcher {
    launcher_settings_file: PathBuf,
    launcher_settings: toml::Table,
    variable_files: Vec<VariableFile>,
}

#[derive(Debug, Clone)]
struct VariableFile {
    path: PathBuf,
    reliable: Regex,
    retry: Regex,
}

impl VariableFile {
    fn new(path: &Path, names: &VariableNames) -> anyhow::Result<Self> {
        let reliable = Regex::new(&format!(
            r"({})\s*=\s*(true|false)",
            regex::escape(&names.reliable_var)
        ))?;
        let retry = Regex::new(&format!(r"({})\s*=\s*\d+", regex::escape(&names.retry_var)))?;

        Ok(Self {
            path: path.to_path_buf(),
            reliable,
            retry,
        })
    }

    fn patch(&self, reliable: bool, timeout_ms: u64) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read variable file {}", self.path.display()))?;

        let reliable_replacement = format!("${{1}} = {reliable}");
        let retry_replacement = format!("${{1}} = {timeout_ms}");

        let mut patched = String::with_capacity(content.len());
        for line in content.lines() {
            let line = line.trim_end();
            if self.reliable.is_match(line) {
                patched.push_str(&self.reliable.replace_all(line, reliable_replacement.as_str()));
            } else if self.retry.is_match(line) {
                patched.push_str(&self.retry.replace_all(line, retry_replacement.as_str()));
            } else {
                patched.push_str(line);
            }
            patched.push('\n');
        }

        std::fs::write(&self.path, patched)
            .with_context(|| format!("Failed to write variable file {}", self.path.display()))
    }
}

impl SettingsPatcher {
    pub fn from_config(config: &BenchConfig) -> anyhow::Result<Self> {
        Ok(Self {
            launcher_settings_file: config.files.launcher_settings_file.clone(),
            launcher_settings: config.launcher_settings.clone(),
            variable_files: vec![
                VariableFile::new(&config.files.client_var_file, &config.client_variables)?,
                VariableFile::new(&config.files.server_var_file, &config.server_variables)?,
            ],
        })
    }
}

impl ConfigPatcher for SettingsPatcher {
    fn set_connection_count(&mut self, connection_count: u32) -> anyhow::Result<()> {
        self.launcher_settings.insert(
            NUM_PLAYERS_SETTING.to_string(),
            toml::Value::Integer(connection_count.into()),
        );

        let content = render_module_exports(&self.launcher_settings)?;
        std::fs::write(&self.launcher_settings_file, content).with_context(|| {
            format!(
                "Failed to write launcher settings {}",
                self.launcher_settings_file.display()
            )
        })
    }

    fn set_reliability(&mut self, reliable: bool, timeout_ms: u64) -> anyhow::Result<()> {
        for file in &self.variable_files {
            file.patch(reliable, timeout_ms)?;
        }
        Ok(())
    }
}

/// Render settings as a JavaScript module, one `key: value` line per setting.
fn render_module_exports(settings: &toml::Table) -> anyhow::Result<String> {
    let entries = settings
        .iter()
        .map(|(key, value)| Ok(format!("    {key}: {}", serde_json::to_string(value)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(format!("module.exports = {{\n{}\n}};\n", entries.join(",\n")))
}
