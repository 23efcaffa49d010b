#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `focus` command line: one autofocus session on the simulated rig (or the
//! I2C lens with feature `hardware`), plus self-check and health probes.

mod cli;
mod error_fmt;
mod focus;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::Parser;
use eyre::WrapErr;
use focus_config::{Config, RangeTable};
use focus_core::runner::RunReport;
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize, reason_name};
use crate::focus::SessionOpts;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        let code = exit_code_for_error(&err);
        tracing::error!(error = %err, code, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(code);
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = focus_config::load_toml(&text).wrap_err("parse config TOML")?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg)?;
    cfg.validate().wrap_err("invalid configuration")?;

    let ranges = cli
        .ranges
        .as_deref()
        .map(focus_config::load_range_csv)
        .transpose()?;
    if let Some(table) = &ranges {
        tracing::debug!(rows = table.rows().len(), "focus range table loaded");
    }

    match cli.cmd {
        Commands::Autofocus {
            zoom,
            start,
            end,
            direct,
            max_run_ms,
            stats,
        } => {
            let request = WindowRequest {
                bounds: start.zip(end),
                zoom,
                ranges: ranges.as_ref(),
            };
            let opts = SessionOpts {
                window_hint: None,
                direct,
                max_run_ms,
            };
            autofocus(&cfg, request, opts, stats, cli.json)
        }
        Commands::Park { position } => park(&cfg, position, cli.json),
        Commands::SelfCheck => self_check(&cfg, ranges.as_ref(), cli.json),
        Commands::Health => {
            let backend = if cfg!(feature = "hardware") { "i2c" } else { "sim" };
            let (min, max) = cfg.focus_range();
            if cli.json {
                println!(
                    "{}",
                    json!({ "status": "ok", "backend": backend, "range": [min, max] })
                );
            } else {
                println!("ok: backend={backend} range=[{min}, {max}]");
            }
            Ok(())
        }
    }
}

/// Where the coarse window comes from, before the lens is consulted.
struct WindowRequest<'a> {
    bounds: Option<(i32, i32)>,
    zoom: Option<u32>,
    ranges: Option<&'a RangeTable>,
}

fn autofocus(
    cfg: &Config,
    request: WindowRequest<'_>,
    mut opts: SessionOpts,
    stats: bool,
    json_out: bool,
) -> eyre::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler; continuing");
        }
    }

    #[cfg(feature = "hardware")]
    let (mut focuser, source) = focus::hardware_rig(cfg)?;
    #[cfg(feature = "hardware")]
    let zoom = focus::effective_zoom(request.bounds, request.zoom, request.ranges, || {
        focus::lens_zoom(&mut focuser)
    })?;

    #[cfg(not(feature = "hardware"))]
    let (focuser, source) = focus::sim_rig(cfg)?;
    // The simulated lens has no zoom register.
    #[cfg(not(feature = "hardware"))]
    let zoom = focus::effective_zoom(request.bounds, request.zoom, request.ranges, || Ok(None))?;

    opts.window_hint = focus::window_hint(request.bounds, zoom, request.ranges)?;
    let opts = &opts;

    let started = Instant::now();
    let result = focus::run_autofocus(cfg, opts, focuser, source, shutdown);
    let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

    match &result {
        Ok(report) => {
            if json_out {
                println!("{}", result_line(Some(report), zoom, opts, duration_ms, None));
            } else {
                let o = &report.outcome;
                let confidence = if o.low_confidence { "low" } else { "ok" };
                println!(
                    "Autofocus complete: position {} (score {:.2}, confidence {confidence}, {} frames, {duration_ms} ms)",
                    o.position, o.score, report.stats.frames
                );
            }
            if stats {
                focus::print_stats(report, cfg.camera.fps);
            }
        }
        Err(err) => {
            if json_out {
                println!(
                    "{}",
                    result_line(None, zoom, opts, duration_ms, Some(reason_name(err)))
                );
            }
        }
    }
    result.map(|_| ())
}

/// One JSON line per session; `final_position` is null when the session failed.
fn result_line(
    report: Option<&RunReport>,
    zoom: Option<u32>,
    opts: &SessionOpts,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    json!({
        "timestamp": ts,
        "final_position": report.map(|r| r.outcome.position),
        "score": report.map(|r| r.outcome.score),
        "low_confidence": report.map(|r| r.outcome.low_confidence),
        "frames": report.map(|r| r.stats.frames),
        "duration_ms": duration_ms,
        "zoom": zoom,
        "window": opts.window_hint.map(|(s, e)| [s, e]),
        "error": error,
    })
    .to_string()
}

fn park(cfg: &Config, position: i32, json_out: bool) -> eyre::Result<()> {
    #[cfg(feature = "hardware")]
    let at = {
        let mut focuser = focus::hardware_focuser(cfg)?;
        let timeout = std::time::Duration::from_millis(cfg.safety.max_run_ms);
        focus::park_hardware(&mut focuser, position, timeout)?
    };
    #[cfg(not(feature = "hardware"))]
    let at = {
        let (mut focuser, _scene) = focus::sim_rig(cfg)?;
        focus::park_sim(&mut focuser, position)?
    };

    if json_out {
        println!("{}", json!({ "status": "ok", "position": at }));
    } else {
        println!("parked at {at}");
    }
    Ok(())
}

fn self_check(cfg: &Config, ranges: Option<&RangeTable>, json_out: bool) -> eyre::Result<()> {
    #[cfg(feature = "hardware")]
    let (focuser, _source) = focus::hardware_rig(cfg)?;
    #[cfg(not(feature = "hardware"))]
    let (focuser, _source) = focus::sim_rig(cfg)?;

    let focuser_msg = focus::self_check(cfg, focuser)?;
    let rows = ranges.map_or(0, |t| t.rows().len());
    if json_out {
        println!(
            "{}",
            json!({ "status": "ok", "focuser": focuser_msg, "range_rows": rows })
        );
    } else {
        println!("self-check ok");
        println!("{focuser_msg}");
        if ranges.is_some() {
            println!("range table: {rows} rows");
        }
    }
    Ok(())
}

/// Console layer on stderr (stdout carries results), plus an optional JSON
/// file layer from `[logging]`. CLI `--log-level` beats the config level;
/// `RUST_LOG` beats both.
fn init_tracing(json_console: bool, cli_level: Option<&str>, cfg: &Config) -> eyre::Result<()> {
    let level = cli_level
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json_console {
        layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if let Some(file) = cfg.logging.file.as_deref() {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path.file_name().unwrap_or(path.as_os_str());
        let appender = match cfg.logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(fmt::layer().json().with_writer(writer).boxed());
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
