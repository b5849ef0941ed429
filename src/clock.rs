//! Time source
//!
//! Every deadline in the trade lifecycle (offer expiry, funding window,
//! confirmation window) is evaluated against a [`Clock`], so sweeps and
//! guards see one consistent "now".

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "mock-api"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "mock-api"))]
mod manual {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Manually advanced clock for scenario tests
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += by;
        }

        pub fn advance_minutes(&self, minutes: i64) {
            self.advance(Duration::minutes(minutes));
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(Utc::now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(|e| e.into_inner())
        }
    }
}
