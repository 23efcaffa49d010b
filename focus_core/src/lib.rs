#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core autofocus logic (hardware-agnostic).
//!
//! All hardware interactions go through `focus_traits::Focuser` and
//! `focus_traits::FrameSource`.
//!
//! ## Architecture
//!
//! - **Sharpness**: ROI crop, luminance, optional denoise, edge metric (`sharpness`)
//! - **Filtering**: rolling median over recent scores (`filter`)
//! - **Scanning**: linear sweep with best-candidate tracking (`scanner`)
//! - **Control**: coarse → fine → settling state machine (`AutofocusCore`)
//! - **Pipeline**: frame pump thread and session runner with watchdogs (`pump`, `runner`)
//!
//! `step()` never blocks: one call scores at most one frame and issues at most
//! one actuator command. Anything that waits lives in `runner`.

pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod filter;
pub mod hw_error;
pub mod mocks;
pub mod pump;
pub mod runner;
pub mod scanner;
pub mod sharpness;
pub mod status;
pub mod util;

pub use builder::{Autofocus, AutofocusBuilder, AutofocusG, Missing, Set, build_autofocus};
pub use config::*;
pub use crate::core::AutofocusCore;
pub use error::{BuildError, FocusError, Report, Result};
pub use filter::ScoreFilter;
pub use scanner::{BestCandidate, ScanStep, ScanWindow, StageScanner};
pub use sharpness::{SharpnessEstimator, frame_from_raw};
pub use status::{FocusOutcome, FocusStatus, ScanStage};
