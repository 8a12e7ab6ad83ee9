//! Host-segment interrupt policy.
//!
//! Every `interval` of wall-clock time the station breaks rotation for a
//! fixed three-slot sequence: host clip, then the cached chart-topper (if
//! any), then back to the playlist exactly where it left off. The check is
//! lazy: it only runs when the station advances, so a long song delays the
//! host segment until it ends.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Track;

pub const DEFAULT_HOST_INTERVAL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostState {
    #[default]
    Normal,
    /// A host segment went out; the next advance owes the chart-topper slot.
    AwaitingChartTopper,
}

/// What the next advance should put on air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    HostSegment,
    ChartTopper(Track),
    /// Move the playlist cursor forward by one.
    Advance,
}

/// Pure transition: given the current host state and what is on air, decide
/// the next state and step.
///
/// `due` is whether the host interval has elapsed.
pub fn transition(
    state: HostState,
    due: bool,
    current_is_host: bool,
    chart_topper: Option<&Track>,
) -> (HostState, Step) {
    match state {
        HostState::Normal if due && !current_is_host => {
            (HostState::AwaitingChartTopper, Step::HostSegment)
        }
        HostState::Normal => (HostState::Normal, Step::Advance),
        HostState::AwaitingChartTopper => match (current_is_host, chart_topper) {
            (true, Some(track)) => (HostState::Normal, Step::ChartTopper(track.clone())),
            // No chart-topper cached, or the host clip was replaced by a user
            // action before it ended: clear the debt and carry on.
            _ => (HostState::Normal, Step::Advance),
        },
    }
}

/// Host-segment timer plus the explicit state of the interrupt sequence.
#[derive(Debug, Clone)]
pub struct HostSchedule {
    interval: Duration,
    last_host_segment: DateTime<Utc>,
    state: HostState,
}

impl HostSchedule {
    /// The first host segment becomes due one `interval` after `started_at`.
    pub fn new(interval: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            interval,
            last_host_segment: started_at,
            state: HostState::Normal,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn last_host_segment(&self) -> DateTime<Utc> {
        self.last_host_segment
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now - self.last_host_segment >= self.interval
    }

    /// Evaluate the policy for one advance and commit the new state.
    pub fn next_step(
        &mut self,
        now: DateTime<Utc>,
        current_is_host: bool,
        chart_topper: Option<&Track>,
    ) -> Step {
        let (state, step) = transition(self.state, self.is_due(now), current_is_host, chart_topper);
        if step == Step::HostSegment {
            self.last_host_segment = now;
        }
        self.state = state;
        step
    }

    /// Drop an owed chart-topper slot, e.g. after the playlist was reshuffled.
    pub fn reset(&mut self) {
        self.state = HostState::Normal;
    }
}
