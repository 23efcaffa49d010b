//! Human-readable error descriptions and structured JSON error formatting.

use crate::cli::LAST_LIMITS;
use crate::focus::error_kind_name;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use focus_core::error::{BuildError, FocusError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingFocuser => {
                "What happened: No focuser was provided to the autofocus engine.\nLikely causes: The lens controller failed to initialize or was not wired into the builder.\nHow to fix: Ensure the focuser is created successfully and passed via with_focuser(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/focus_config.toml for a sample."
            ),
        };
    }

    if let Some(fe) = err.downcast_ref::<FocusError>() {
        return match fe {
            FocusError::ActuatorFault(msg) => format!(
                "What happened: The focus actuator rejected a command ({msg}).\nLikely causes: Loose I2C wiring, wrong bus/address, or the lens controller is not powered.\nHow to fix: Check [focuser] i2c_bus/i2c_addr and the wiring, then run `self-check`."
            ),
            FocusError::ActuatorTimeout => "What happened: The focus actuator did not respond in time.\nLikely causes: Lens controller busy or hung, or bus contention.\nHow to fix: Power-cycle the lens controller and run `self-check`.".to_string(),
            FocusError::DegenerateScan { start, end } => format!(
                "What happened: The scan window is empty (start {start} > end {end}).\nLikely causes: --start/--end swapped, or a range table row outside the focuser range.\nHow to fix: Pass start <= end within [focuser] min_focus..max_focus, or fix the range CSV."
            ),
            FocusError::FrameTimeout => "What happened: No camera frames arrived within the watchdog threshold.\nLikely causes: Camera not streaming, wrong frame size, or camera.frame_timeout_ms too low.\nHow to fix: Check the camera feed and [camera] width/height, and consider raising camera.frame_timeout_ms.".to_string(),
            FocusError::Cancelled => "What happened: Autofocus was cancelled.\nLikely causes: Ctrl-C or a shutdown request.\nHow to fix: Nothing to fix; the lens was left at its last commanded position. Rerun when ready.".to_string(),
            FocusError::State(msg) if msg.contains("max run time") => "What happened: max run time was exceeded.\nLikely causes: Slow camera, high scan.settle_frames, or very small scan steps.\nHow to fix: Increase safety.max_run_ms (or --max-run-ms) or coarsen scan.coarse_step/fine_step.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    let root = err.root_cause().to_string();

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read ({root}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config with a readable TOML file."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("parse config") {
        return format!(
            "What happened: Configuration is invalid ({root}).\nLikely causes: Missing [focuser] max_focus, or out-of-range values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("open lens controller") {
        return "What happened: Failed to open the lens controller.\nLikely causes: I2C disabled, wrong bus number, or insufficient permissions.\nHow to fix: Enable I2C, check [focuser] i2c_bus, and ensure access to /dev/i2c-*.".to_string();
    }

    // Range CSV header special-case
    if lower.contains("focus range csv must have headers") {
        return "Invalid headers in focus range CSV. Expected 'zoom,start,end'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure kind; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use focus_core::error::FocusError;
    match err.downcast_ref::<FocusError>() {
        Some(FocusError::ActuatorFault(_) | FocusError::ActuatorTimeout) => 3,
        Some(FocusError::DegenerateScan { .. }) => 4,
        Some(FocusError::FrameTimeout) => 5,
        Some(FocusError::Cancelled) => 6,
        Some(FocusError::State(_)) => 7,
        _ => 1,
    }
}

/// Short reason tag for JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    err.downcast_ref::<focus_core::error::FocusError>()
        .map_or("Error", error_kind_name)
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use focus_core::error::FocusError;
    use serde_json::json;

    let msg = humanize(err);
    let limits = LAST_LIMITS.get();
    let details = match err.downcast_ref::<FocusError>() {
        Some(FocusError::FrameTimeout) => {
            limits.map(|l| json!({ "frame_timeout_ms": l.frame_timeout_ms }))
        }
        Some(FocusError::State(s)) if s.contains("max run time") => {
            limits.map(|l| json!({ "max_run_ms": l.max_run_ms }))
        }
        Some(FocusError::DegenerateScan { start, end }) => Some(json!({
            "start": start,
            "end": end,
            "range": limits.map(|l| [l.range.0, l.range.1]),
        })),
        _ => None,
    };

    match details {
        Some(d) => json!({ "reason": reason_name(err), "details": d, "message": msg }),
        None => json!({ "reason": reason_name(err), "message": msg }),
    }
    .to_string()
}
