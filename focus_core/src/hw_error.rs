//! Maps `Box<dyn Error>` from trait boundaries to typed `FocusError`.
//!
//! `focus_traits` uses `Box<dyn Error + Send + Sync>` so drivers can return
//! whatever they like; with feature `hardware-errors` the known
//! `focus_hardware::HwError` variants are mapped precisely.

use crate::error::FocusError;

/// Map an actuator error to a typed `FocusError`.
///
/// Known hardware errors are downcast first, anything else falls back to a
/// string heuristic.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> FocusError {
    #[cfg(feature = "hardware-errors")]
    {
        use focus_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::BusyTimeout => FocusError::ActuatorTimeout,
                other => FocusError::ActuatorFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        FocusError::ActuatorTimeout
    } else {
        FocusError::ActuatorFault(s)
    }
}
