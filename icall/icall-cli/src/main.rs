//! `icall`: load a WebAssembly module, ask its resolver export for a table
//! slot and call that slot with one `u32` argument.
//!
//! Exit status is 0 on success, 1 when the dispatch fails and 2 when the
//! module or configuration cannot be loaded.

mod config;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use icall_core::{dispatch, DispatchError};
use icall_wasm::{HostImports, Runtime, StubImports};
use tracing::{debug, info};

use crate::config::Settings;
use crate::logging::{LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "icall", version, about)]
pub struct Cli {
    /// Module to load, binary `.wasm` or text `.wat`
    pub module: PathBuf,

    /// Export that returns the table index [default: addr]
    #[arg(long, env = "ICALL_EXPORT")]
    pub export: Option<String>,

    /// Argument passed to the function in the table slot [default: 0]
    #[arg(long, env = "ICALL_ARG")]
    pub arg: Option<u32>,

    /// Execution context stack size in bytes [default: runtime.default_stack_size]
    #[arg(long, env = "ICALL_STACK_SIZE")]
    pub stack_size: Option<u32>,

    /// TOML file with [runtime], [dispatch] and [log] tables
    #[arg(long, env = "ICALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Satisfy every function import with a stub that returns zero
    #[arg(long, env = "ICALL_STUB_IMPORTS")]
    pub stub_imports: bool,

    #[arg(long, value_enum, env = "ICALL_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    #[arg(long, value_enum, env = "ICALL_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

fn run(settings: &Settings) -> anyhow::Result<Result<(), DispatchError>> {
    let path = &settings.module;
    let bytes = wat::parse_file(path).with_context(|| format!("reading module {}", path.display()))?;
    let mut rt = Runtime::new(settings.runtime.clone()).context("invalid runtime configuration")?;
    let module = rt.load(&bytes).with_context(|| format!("loading module {}", path.display()))?;
    let instance = if settings.stub_imports {
        rt.instantiate(&module, &StubImports)
    } else {
        rt.instantiate(&module, &HostImports::new())
    }
    .context("instantiating module")?;
    info!(
        module = %path.display(),
        exports = ?module.function_exports().collect::<Vec<_>>(),
        "module instantiated"
    );

    let outcome = dispatch(&mut rt, &instance, settings.stack_size, &settings.export, settings.arg);
    debug!(live_exec_envs = rt.live_exec_envs(), "dispatch finished");
    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::resolve(&cli) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };
    logging::init(settings.log_level, settings.log_format);
    debug!(?settings, "settings resolved");

    match run(&settings) {
        Ok(Ok(())) => {
            println!("indirect call succeeded");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            let message = err.engine_message().map_or_else(|| err.to_string(), str::to_string);
            eprintln!("dispatch failed: {}: {message}", err.kind());
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
