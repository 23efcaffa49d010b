use focus_config::{ApproachDirection, FineWindow, Metric, RunMode, load_toml};
use rstest::rstest;

const MINIMAL: &str = r#"
[focuser]
max_focus = 1200
"#;

fn with_section(extra: &str) -> String {
    format!("{MINIMAL}\n{extra}")
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = load_toml(MINIMAL).expect("parse TOML");
    cfg.validate().expect("defaults should be valid");
    assert_eq!(cfg.focus_range(), (0, 1200));
    assert_eq!(cfg.focuser.i2c_bus, 1);
    assert_eq!(cfg.focuser.i2c_addr, 0x0C);
    assert_eq!(cfg.scan.coarse_step, 80);
    assert_eq!(cfg.scan.fine_step, 10);
    assert_eq!(cfg.scan.fine_window, FineWindow::Centered);
    assert_eq!(cfg.filter.median_window, 3);
    assert_eq!(cfg.sharpness.metric, Metric::LaplacianVariance);
    assert!(!cfg.backlash.enabled);
    assert_eq!(cfg.runner.mode, RunMode::Pump);
}

#[test]
fn full_config_parses() {
    let toml = r#"
[focuser]
min_focus = 0
max_focus = 1100
i2c_bus = 7
i2c_addr = 12

[sharpness]
metric = "tenengrad"
roi = { x = 100, y = 60, width = 120, height = 90 }
blur_sigma = 1.0
edge_floor = 20.0

[filter]
median_window = 5

[scan]
coarse_step = 100
fine_step = 5
fine_margin = 100
fine_window = "below"
settle_frames = 3

[backlash]
enabled = true
direction = "from_above"
overshoot = 30
settle_frames = 4

[confidence]
min_score = 12.5

[camera]
fps = 60
frame_timeout_ms = 100
width = 640
height = 360

[safety]
max_run_ms = 20000

[logging]
level = "debug"
rotation = "daily"

[runner]
mode = "direct"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.sharpness.metric, Metric::Tenengrad);
    assert_eq!(cfg.sharpness.roi.map(|r| r.width), Some(120));
    assert_eq!(cfg.scan.fine_window, FineWindow::Below);
    assert_eq!(cfg.backlash.direction, ApproachDirection::FromAbove);
    assert_eq!(cfg.runner.mode, RunMode::Direct);
    assert_eq!(cfg.camera.width, 640);
}

#[test]
fn missing_focuser_section_fails_to_parse() {
    let err = load_toml("[scan]\ncoarse_step = 80\n").expect_err("focuser is required");
    assert!(err.to_string().contains("focuser"));
}

#[test]
fn unknown_metric_fails_to_parse() {
    let toml = with_section("[sharpness]\nmetric = \"fft\"\n");
    assert!(load_toml(&toml).is_err());
}

#[rstest]
#[case("[focuser]\nmax_focus = 0\n", "focuser.max_focus must be > focuser.min_focus")]
#[case("[focuser]\nmin_focus = -5\nmax_focus = 100\n", "focuser.min_focus must be >= 0")]
#[case("[focuser]\nmax_focus = 100\ni2c_addr = 200\n", "7-bit address")]
fn rejects_bad_focuser(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "{err}");
}

#[rstest]
#[case("[scan]\ncoarse_step = 0\n", "scan.coarse_step must be > 0")]
#[case("[scan]\nfine_step = 0\n", "scan.fine_step must be > 0")]
#[case("[scan]\ncoarse_step = 10\nfine_step = 10\n", "smaller than scan.coarse_step")]
#[case("[scan]\ncoarse_step = 5000\n", "must not exceed the focus range")]
#[case("[scan]\nfine_margin = 0\n", "scan.fine_margin must be > 0")]
#[case("[filter]\nmedian_window = 0\n", "filter.median_window must be >= 1")]
#[case("[sharpness]\nroi_fraction = 0.0\n", "sharpness.roi_fraction")]
#[case("[sharpness]\nroi_fraction = 1.5\n", "sharpness.roi_fraction")]
#[case("[sharpness]\nroi = { x = 0, y = 0, width = 2, height = 50 }\n", "at least 3x3")]
#[case("[sharpness]\nblur_sigma = -1.0\n", "sharpness.blur_sigma")]
#[case("[sharpness]\nedge_floor = -0.5\n", "sharpness.edge_floor")]
#[case("[backlash]\novershoot = -1\n", "backlash.overshoot must be >= 0")]
#[case("[confidence]\nmin_score = -1.0\n", "confidence.min_score")]
#[case("[camera]\nfps = 0\n", "camera.fps")]
#[case("[camera]\nframe_timeout_ms = 0\n", "camera.frame_timeout_ms")]
#[case("[safety]\nmax_run_ms = 0\n", "safety.max_run_ms")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
#[case("[simulation]\ndepth_of_field = 0.0\n", "simulation.depth_of_field")]
fn rejects_out_of_range_fields(#[case] section: &str, #[case] needle: &str) {
    let cfg = load_toml(&with_section(section)).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(format!("{err}").contains(needle), "{err}");
}

#[test]
fn shipped_sample_config_is_valid() {
    let cfg = load_toml(include_str!("../../etc/focus_config.toml")).expect("parse sample");
    cfg.validate().expect("sample validates");
    assert_eq!(cfg.focus_range(), (0, 1200));
    assert_eq!(cfg.runner.mode, RunMode::Pump);
}

#[test]
fn shipped_range_table_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/focus_ranges.csv");
    let table = focus_config::load_range_csv(&path).expect("load sample ranges");
    assert_eq!(table.rows().len(), 3);
    assert_eq!(table.hint_for_zoom(0), (0, 1100));
}
