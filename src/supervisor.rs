//! Top-level fault policy.
//!
//! A cycle either completes and the node deep-sleeps for the reported
//! duration, or it fails (error or panic) and the node waits the fault delay
//! and resets. It never halts in a faulted state.
//!
//! ```
//! use espnow_sensor_node::supervisor::{supervise, Verdict};
//! use espnow_sensor_node::link::LinkError;
//! use espnow_sensor_node::controller::CycleError;
//!
//! let verdict = supervise(|| Err(CycleError::Link(LinkError::Closed)));
//! assert_eq!(verdict, Verdict::Reset);
//! ```

use crate::controller::{CycleError, CycleReport};
use log::error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// What to do once a cycle has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Deep-sleep for this long.
    Sleep(Duration),
    /// Wait the fault delay, then hard-reset.
    Reset,
}

/// Run one cycle, turning any failure into [`Verdict::Reset`].
pub fn supervise<F>(cycle: F) -> Verdict
where
    F: FnOnce() -> Result<CycleReport, CycleError>,
{
    match panic::catch_unwind(AssertUnwindSafe(cycle)) {
        Ok(Ok(report)) => Verdict::Sleep(report.sleep_for),
        Ok(Err(e)) => {
            error!("Node error: {}", e);
            Verdict::Reset
        }
        Err(payload) => {
            error!("Node panicked: {}", panic_message(payload.as_ref()));
            Verdict::Reset
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkError;
    use crate::platform::Platform;
    use crate::settings::NodeSettings;
    use crate::test_support::ManualClock;

    fn report(sleep_ms: u64) -> CycleReport {
        CycleReport {
            boot_count: 2,
            settings: NodeSettings::default(),
            control_messages: 0,
            telemetry_sent: true,
            sleep_for: Duration::from_millis(sleep_ms),
        }
    }

    /// Platform that unwinds instead of powering down.
    struct UnwindingPlatform;

    impl Platform for UnwindingPlatform {
        fn deep_sleep(&mut self, duration: Duration) -> ! {
            panic!("deep sleep {}ms", duration.as_millis())
        }

        fn restart(&mut self) -> ! {
            panic!("restart")
        }
    }

    fn terminal_action(verdict: Verdict, clock: &ManualClock) -> String {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            UnwindingPlatform.finish(verdict, clock, Duration::from_secs(5))
        }));
        match result {
            Ok(_) => String::from("returned"),
            Err(payload) => panic_message(payload.as_ref()).to_string(),
        }
    }

    #[test]
    fn test_completed_cycle_sleeps() {
        assert_eq!(
            supervise(|| Ok(report(20000))),
            Verdict::Sleep(Duration::from_millis(20000))
        );
    }

    #[test]
    fn test_error_resets() {
        assert_eq!(supervise(|| Err(LinkError::Closed.into())), Verdict::Reset);
    }

    #[test]
    fn test_panic_resets() {
        assert_eq!(supervise(|| panic!("sensor bus locked up")), Verdict::Reset);
    }

    #[test]
    fn test_finish_sleeps_for_verdict() {
        let clock = ManualClock::new();
        let action = terminal_action(Verdict::Sleep(Duration::from_millis(1500)), &clock);
        assert_eq!(action, "deep sleep 1500ms");
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_finish_waits_then_restarts() {
        let clock = ManualClock::new();
        assert_eq!(terminal_action(Verdict::Reset, &clock), "restart");
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }
}
