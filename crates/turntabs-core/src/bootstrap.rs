#![forbid(unsafe_code)]

//! Startup wait for the host page.
//!
//! The host renders its layout asynchronously. [`BootstrapWait`] polls for
//! the injection landmark and, once it appears, asks for one more settle
//! delay so the transcript has time to render before the first pass.
//!
//! The wait does not sleep. [`BootstrapWait::poll`] says how long to wait
//! next and the host decides how: a `setTimeout` promise in the browser, a
//! simulated clock in tests.
//!
//! ```
//! use core::time::Duration;
//! use turntabs_core::bootstrap::{BootstrapConfig, BootstrapWait, WaitStep};
//! use turntabs_tree::Selector;
//! use turntabs_tree::mem::MemTree;
//!
//! let mut tree = MemTree::new();
//! let body = tree.body();
//! tree.element(body, "main", &[]);
//!
//! let mut wait = BootstrapWait::new(BootstrapConfig::default(), Selector::tag("main"));
//! assert_eq!(wait.poll(&tree), Ok(WaitStep::RetryAfter(Duration::from_millis(1000))));
//! assert_eq!(wait.poll(&tree), Ok(WaitStep::Ready));
//! ```

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use turntabs_tree::{HostTree, Selector};

/// Timings of the startup wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Delay between probes while the landmark is missing.
    pub poll_interval_ms: u64,
    /// Delay after the landmark appears, before the first pass.
    pub settle_delay_ms: u64,
    /// Probes before giving up.
    pub max_attempts: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            settle_delay_ms: 1000,
            max_attempts: 240,
        }
    }
}

/// What the host should do after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStep {
    /// Start the engine.
    Ready,
    /// Probe again after the given delay.
    RetryAfter(Duration),
}

/// Why the wait ended without the page becoming ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The landmark never appeared.
    NotReady { attempts: u32 },
    /// [`BootstrapWait::cancel`] was called.
    Cancelled,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady { attempts } => {
                write!(f, "host page not ready after {attempts} attempts")
            }
            Self::Cancelled => write!(f, "startup wait cancelled"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Bounded, cancellable poll for the injection landmark.
#[derive(Debug, Clone)]
pub struct BootstrapWait {
    config: BootstrapConfig,
    landmark: Selector,
    attempts: u32,
    settling: bool,
    cancelled: bool,
}

impl BootstrapWait {
    #[must_use]
    pub fn new(config: BootstrapConfig, landmark: Selector) -> Self {
        Self {
            config,
            landmark,
            attempts: 0,
            settling: false,
            cancelled: false,
        }
    }

    /// Probe the tree once.
    pub fn poll<T: HostTree>(&mut self, tree: &T) -> Result<WaitStep, WaitError> {
        if self.cancelled {
            return Err(WaitError::Cancelled);
        }
        if self.settling {
            info!(attempts = self.attempts, "host page ready");
            return Ok(WaitStep::Ready);
        }
        if self.attempts >= self.config.max_attempts {
            return Err(WaitError::NotReady {
                attempts: self.attempts,
            });
        }
        self.attempts += 1;
        if tree.query_first(None, &self.landmark).is_some() {
            debug!(attempts = self.attempts, "landmark found, settling");
            self.settling = true;
            return Ok(WaitStep::RetryAfter(Duration::from_millis(
                self.config.settle_delay_ms,
            )));
        }
        debug!(attempts = self.attempts, "landmark missing, retrying");
        Ok(WaitStep::RetryAfter(Duration::from_millis(
            self.config.poll_interval_ms,
        )))
    }

    /// Make every further poll fail with [`WaitError::Cancelled`].
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Probes made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Poll until ready, calling `sleep` between probes.
    ///
    /// `sleep` gets the tree mutably so synchronous hosts can advance the
    /// page while "waiting".
    pub fn drive<T, F>(&mut self, tree: &mut T, mut sleep: F) -> Result<(), WaitError>
    where
        T: HostTree,
        F: FnMut(&mut T, Duration),
    {
        loop {
            match self.poll(tree)? {
                WaitStep::Ready => return Ok(()),
                WaitStep::RetryAfter(delay) => sleep(tree, delay),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turntabs_tree::mem::MemTree;

    fn wait(max_attempts: u32) -> BootstrapWait {
        BootstrapWait::new(
            BootstrapConfig {
                max_attempts,
                ..BootstrapConfig::default()
            },
            Selector::tag("main"),
        )
    }

    #[test]
    fn missing_landmark_polls_at_interval() {
        let tree = MemTree::new();
        let mut wait = wait(3);
        for _ in 0..3 {
            assert_eq!(
                wait.poll(&tree),
                Ok(WaitStep::RetryAfter(Duration::from_millis(500)))
            );
        }
        assert_eq!(wait.poll(&tree), Err(WaitError::NotReady { attempts: 3 }));
    }

    #[test]
    fn drive_waits_for_late_landmark() {
        let mut tree = MemTree::new();
        let mut wait = wait(10);
        let mut slept = Vec::new();
        wait.drive(&mut tree, |tree, delay| {
            slept.push(delay.as_millis());
            if slept.len() == 2 {
                let body = tree.body();
                tree.element(body, "main", &[]);
            }
        })
        .unwrap();
        assert_eq!(slept, vec![500, 500, 1000]);
        assert_eq!(wait.attempts(), 3);
    }

    #[test]
    fn cancelled_wait_stops() {
        let mut tree = MemTree::new();
        let mut wait = wait(10);
        let result = wait.drive(&mut tree, |_, _| {});
        assert_eq!(result, Err(WaitError::NotReady { attempts: 10 }));

        let mut wait = self::wait(10);
        wait.cancel();
        assert!(wait.is_cancelled());
        assert_eq!(wait.poll(&tree), Err(WaitError::Cancelled));
        assert_eq!(WaitError::Cancelled.to_string(), "startup wait cancelled");
    }

    #[test]
    fn config_reads_camel_case() {
        let config: BootstrapConfig =
            serde_json::from_str(r#"{ "pollIntervalMs": 50, "maxAttempts": 4 }"#).unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.settle_delay_ms, 1000);
        assert_eq!(config.max_attempts, 4);
    }
}
