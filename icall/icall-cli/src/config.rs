//! Settings for one run: defaults, then the TOML file, then flags and
//! `ICALL_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context;
use icall_wasm::RuntimeConfig;
use serde::Deserialize;

use crate::logging::{LogFormat, LogLevel};
use crate::Cli;

pub const DEFAULT_EXPORT: &str = "addr";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub runtime: RuntimeConfig,
    pub dispatch: DispatchSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub export: Option<String>,
    pub arg: Option<u32>,
    /// Falls back to `runtime.default_stack_size`.
    pub stack_size: Option<u32>,
    pub stub_imports: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub level: Option<LogLevel>,
    pub format: Option<LogFormat>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub module: PathBuf,
    pub runtime: RuntimeConfig,
    pub export: String,
    pub arg: u32,
    pub stack_size: u32,
    pub stub_imports: bool,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let runtime = file.runtime;
        runtime.validate().context("invalid [runtime] configuration")?;
        let stack_size = cli.stack_size.or(file.dispatch.stack_size).unwrap_or(runtime.default_stack_size);
        Ok(Self {
            module: cli.module.clone(),
            export: cli.export.clone().or(file.dispatch.export).unwrap_or_else(|| DEFAULT_EXPORT.to_string()),
            arg: cli.arg.or(file.dispatch.arg).unwrap_or(0),
            stack_size,
            stub_imports: cli.stub_imports || file.dispatch.stub_imports,
            log_level: cli.log_level.or(file.log.level).unwrap_or_default(),
            log_format: cli.log_format.or(file.log.format).unwrap_or_default(),
            runtime,
        })
    }
}
