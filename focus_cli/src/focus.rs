//! Autofocus session wiring: config mapping, window selection, rig assembly and the run.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use eyre::WrapErr;
use focus_config::{Config, RangeTable};
use focus_core::error::{FocusError, Report, Result as CoreResult};
use focus_core::hw_error::map_hw_error;
use focus_core::runner::{RunMode, RunParams, RunReport};
use focus_hardware::{SceneCfg, SimLensCfg, SimulatedFocuser, SimulatedLens, SyntheticScene};
use focus_traits::{Focuser, FrameSource};

use crate::cli::{CliLimits, LAST_LIMITS};

/// Test hook: override `[simulation].peak`.
pub const ENV_SIM_PEAK: &str = "FOCUS_TEST_SIM_PEAK";
/// Test hook: simulated actuator fails every move after this many.
pub const ENV_SIM_FAULT_AFTER: &str = "FOCUS_TEST_SIM_FAULT_AFTER";
/// Test hook: simulated camera stops delivering after this many frames.
pub const ENV_SIM_STALL: &str = "FOCUS_TEST_SIM_STALL";

pub fn error_kind_name(e: &FocusError) -> &'static str {
    match e {
        FocusError::InvalidFrame(_) => "InvalidFrame",
        FocusError::ActuatorFault(_) => "ActuatorFault",
        FocusError::ActuatorTimeout => "ActuatorTimeout",
        FocusError::DegenerateScan { .. } => "DegenerateScan",
        FocusError::Config(_) => "Config",
        FocusError::State(_) => "State",
        FocusError::FrameTimeout => "FrameTimeout",
        FocusError::Cancelled => "Cancelled",
    }
}

/// Per-invocation knobs from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOpts {
    pub window_hint: Option<(i32, i32)>,
    pub direct: bool,
    pub max_run_ms: Option<u64>,
}

/// Zoom step that selects the coarse window.
///
/// A `--zoom` from the command line wins. Without one the lens controller is
/// asked, but only when a range table is loaded and no explicit bounds were
/// given, since nothing else consumes the zoom.
pub fn effective_zoom(
    explicit: Option<(i32, i32)>,
    zoom: Option<u32>,
    ranges: Option<&RangeTable>,
    read_lens_zoom: impl FnOnce() -> eyre::Result<Option<u32>>,
) -> eyre::Result<Option<u32>> {
    if zoom.is_some() || explicit.is_some() || ranges.is_none() {
        return Ok(zoom);
    }
    let lens = read_lens_zoom()?;
    if let Some(zoom) = lens {
        tracing::info!(zoom, "zoom step read from lens controller");
    }
    Ok(lens)
}

/// Coarse window for this run: explicit bounds win over the zoom table; with
/// neither the whole actuator range is swept.
pub fn window_hint(
    explicit: Option<(i32, i32)>,
    zoom: Option<u32>,
    ranges: Option<&RangeTable>,
) -> eyre::Result<Option<(i32, i32)>> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    match (zoom, ranges) {
        (Some(zoom), Some(table)) => {
            let (start, end) = table.hint_for_zoom(zoom);
            tracing::info!(zoom, start, end, "coarse window from range table");
            Ok(Some((start, end)))
        }
        (Some(_), None) => eyre::bail!("--zoom needs a focus range table (pass --ranges FILE)"),
        (None, _) => Ok(None),
    }
}

/// Map the typed config plus CLI overrides onto runner parameters.
pub fn run_params(cfg: &Config, opts: &SessionOpts) -> RunParams {
    RunParams {
        sharpness: (&cfg.sharpness).into(),
        filter: (&cfg.filter).into(),
        scan: (&cfg.scan).into(),
        backlash: (&cfg.backlash).into(),
        confidence: (&cfg.confidence).into(),
        window_hint: opts.window_hint,
        mode: if opts.direct {
            RunMode::Direct
        } else {
            cfg.runner.mode.into()
        },
        fps: cfg.camera.fps,
        frame_timeout_ms: cfg.camera.frame_timeout_ms,
        max_run_ms: opts.max_run_ms.unwrap_or(cfg.safety.max_run_ms),
    }
}

pub fn run_autofocus<F, S>(
    cfg: &Config,
    opts: &SessionOpts,
    focuser: F,
    source: S,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<RunReport>
where
    F: Focuser,
    S: FrameSource + Send + 'static,
{
    let params = run_params(cfg, opts);
    let _ = LAST_LIMITS.set(CliLimits {
        max_run_ms: params.max_run_ms,
        frame_timeout_ms: params.frame_timeout_ms,
        range: focuser.range(),
    });
    tracing::info!(
        mode = ?params.mode,
        fps = params.fps,
        max_run_ms = params.max_run_ms,
        hint = ?params.window_hint,
        "autofocus requested"
    );
    focus_core::runner::run(focuser, source, params, Some(shutdown))
}

fn env_parse<T>(key: &str) -> eyre::Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| eyre::eyre!("{key}={v:?} is not valid: {e}")),
        Err(_) => Ok(None),
    }
}

/// Simulated lens and synthetic camera built from `[simulation]` and `[camera]`.
#[cfg_attr(feature = "hardware", allow(dead_code))]
pub fn sim_rig(cfg: &Config) -> eyre::Result<(SimulatedFocuser, SyntheticScene)> {
    let sim = &cfg.simulation;
    let lens = SimulatedLens::new(SimLensCfg {
        range: cfg.focus_range(),
        latency_frames: sim.latency_frames,
        backlash: sim.backlash,
        fault_after: env_parse(ENV_SIM_FAULT_AFTER)?,
    });
    let scene = SyntheticScene::new(
        lens.clone(),
        SceneCfg {
            width: cfg.camera.width,
            height: cfg.camera.height,
            peak: env_parse(ENV_SIM_PEAK)?.unwrap_or(sim.peak),
            depth_of_field: sim.depth_of_field,
            noise: sim.noise,
            seed: sim.seed,
            stall_after: env_parse(ENV_SIM_STALL)?,
        },
    );
    tracing::debug!(range = ?cfg.focus_range(), "simulated rig ready");
    Ok((SimulatedFocuser::new(lens), scene))
}

#[cfg(feature = "hardware")]
pub fn hardware_focuser(cfg: &Config) -> eyre::Result<focus_hardware::i2c::I2cFocuser> {
    focus_hardware::i2c::I2cFocuser::new(
        cfg.focuser.i2c_bus,
        cfg.focuser.i2c_addr,
        cfg.focus_range(),
    )
    .wrap_err("open lens controller")
}

/// I2C lens controller plus raw `rgb24` frames on stdin.
#[cfg(feature = "hardware")]
pub fn hardware_rig(
    cfg: &Config,
) -> eyre::Result<(focus_hardware::i2c::I2cFocuser, focus_hardware::RawRgbReader)> {
    let focuser = hardware_focuser(cfg)?;
    let frames =
        focus_hardware::RawRgbReader::new(std::io::stdin(), cfg.camera.width, cfg.camera.height);
    Ok((focuser, frames))
}

#[cfg(feature = "hardware")]
pub fn lens_zoom(focuser: &mut focus_hardware::i2c::I2cFocuser) -> eyre::Result<Option<u32>> {
    focuser.zoom().map(Some).wrap_err("read zoom step from lens controller")
}

/// Drive the I2C lens to `position` and wait for the controller to go idle.
#[cfg(feature = "hardware")]
pub fn park_hardware(
    focuser: &mut focus_hardware::i2c::I2cFocuser,
    position: i32,
    timeout: std::time::Duration,
) -> CoreResult<i32> {
    focuser
        .park(position, timeout)
        .map_err(|e| Report::new(map_hw_error(&e)).wrap_err("parking lens"))?;
    focuser
        .get()
        .map_err(|e| Report::new(map_hw_error(&*e)).wrap_err("reading parked position"))
}

/// Move the simulated lens to `position` and let it land.
#[cfg_attr(feature = "hardware", allow(dead_code))]
pub fn park_sim(focuser: &mut SimulatedFocuser, position: i32) -> CoreResult<i32> {
    focuser
        .set(position)
        .map_err(|e| Report::new(map_hw_error(&*e)).wrap_err("parking lens"))?;
    let lens = focuser.lens();
    for _ in 0..lens.cfg().latency_frames {
        lens.tick();
    }
    Ok(lens.physical())
}

/// Probe the focuser and make sure the core accepts the mapped config.
pub fn self_check<F: Focuser>(cfg: &Config, mut focuser: F) -> eyre::Result<String> {
    let range = focuser.range();
    if range != cfg.focus_range() {
        tracing::warn!(?range, configured = ?cfg.focus_range(), "focuser range differs from config");
    }
    let position = focuser
        .get()
        .map_err(|e| Report::new(map_hw_error(&*e)).wrap_err("probing focuser"))?;
    let params = run_params(cfg, &SessionOpts::default());
    focus_core::build_autofocus(
        focuser,
        params.sharpness,
        params.filter,
        params.scan,
        params.backlash,
        params.confidence,
    )
    .wrap_err("building autofocus controller")?;
    Ok(format!(
        "focuser ok: position={position} range=[{}, {}]",
        range.0, range.1
    ))
}

/// Print step timing to stderr.
pub fn print_stats(report: &RunReport, fps: u32) {
    let s = &report.stats;
    let period_us = focus_core::util::period_us(fps);
    eprintln!("\n--- Autofocus Stats ---");
    eprintln!("Frames stepped: {}", s.frames);
    eprintln!("Frame period (us): {period_us}");
    eprintln!(
        "Step latency mean/max (us): {:.1} / {}",
        s.mean_step_us, s.max_step_us
    );
    eprintln!("Elapsed (ms): {}", s.elapsed_ms);
    eprintln!("-----------------------\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        focus_config::load_toml("[focuser]\nmax_focus = 1200\n").unwrap()
    }

    #[test]
    fn explicit_window_beats_zoom_table() {
        let table = RangeTable::from_rows(vec![focus_config::RangeRow {
            zoom: 0,
            start: 100,
            end: 300,
        }])
        .unwrap();
        let hint = window_hint(Some((5, 6)), Some(0), Some(&table)).unwrap();
        assert_eq!(hint, Some((5, 6)));
        let hint = window_hint(None, Some(0), Some(&table)).unwrap();
        assert_eq!(hint, Some((100, 300)));
        assert_eq!(window_hint(None, None, Some(&table)).unwrap(), None);
    }

    #[test]
    fn lens_zoom_fills_in_when_only_the_table_is_given() {
        let table = RangeTable::from_rows(vec![
            focus_config::RangeRow {
                zoom: 0,
                start: 100,
                end: 300,
            },
            focus_config::RangeRow {
                zoom: 10,
                start: 200,
                end: 500,
            },
        ])
        .unwrap();
        let zoom = effective_zoom(None, None, Some(&table), || Ok(Some(10))).unwrap();
        assert_eq!(zoom, Some(10));
        assert_eq!(
            window_hint(None, zoom, Some(&table)).unwrap(),
            Some((200, 500))
        );
    }

    #[test]
    fn lens_is_only_asked_when_its_zoom_would_be_used() {
        let table = RangeTable::from_rows(vec![focus_config::RangeRow {
            zoom: 0,
            start: 100,
            end: 300,
        }])
        .unwrap();
        let asked = std::cell::Cell::new(0);
        let read = || {
            asked.set(asked.get() + 1);
            Ok(Some(7))
        };

        assert_eq!(effective_zoom(None, Some(0), Some(&table), read).unwrap(), Some(0));
        assert_eq!(effective_zoom(Some((1, 2)), None, Some(&table), read).unwrap(), None);
        assert_eq!(effective_zoom(None, None, None, read).unwrap(), None);
        assert_eq!(asked.get(), 0);

        let err = effective_zoom(None, None, Some(&table), || {
            Err(eyre::eyre!("bus nack"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("bus nack"));
    }

    #[test]
    fn park_moves_the_simulated_lens_and_waits_for_it() {
        let mut c = cfg();
        c.simulation.latency_frames = 3;
        let (mut focuser, _scene) = sim_rig(&c).unwrap();
        assert_eq!(park_sim(&mut focuser, 500).unwrap(), 500);
        assert_eq!(focuser.lens().history(), vec![500]);

        let err = park_sim(&mut focuser, 5000).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FocusError>(),
            Some(FocusError::ActuatorFault(_))
        ));
        assert_eq!(focuser.lens().physical(), 500);
    }

    #[test]
    fn zoom_without_table_is_an_error() {
        let err = window_hint(None, Some(3), None).unwrap_err();
        assert!(err.to_string().contains("--ranges"));
    }

    #[test]
    fn direct_flag_and_max_run_override_win() {
        let c = cfg();
        let p = run_params(
            &c,
            &SessionOpts {
                window_hint: None,
                direct: true,
                max_run_ms: Some(123),
            },
        );
        assert_eq!(p.mode, RunMode::Direct);
        assert_eq!(p.max_run_ms, 123);
        let p = run_params(&c, &SessionOpts::default());
        assert_eq!(p.mode, RunMode::Pump);
        assert_eq!(p.max_run_ms, 30_000);
    }

    #[test]
    fn self_check_reports_simulated_focuser() {
        let c = cfg();
        let (focuser, _scene) = sim_rig(&c).unwrap();
        let msg = self_check(&c, focuser).unwrap();
        assert!(msg.contains("range=[0, 1200]"), "{msg}");
    }
}
