// Periodic version snapshots keyed to active time.
//
// The scheduler advances its threshold as soon as a target is reached, so a
// failed create never blocks later snapshots. A sustained outage skips
// snapshots rather than retrying them.

use std::time::Duration;

use folio_common::protocol::versions::CreateVersionRequest;
use folio_common::types::{Document, EditableState};
use tracing::debug;

use crate::active_time::{ActiveTimeClock, ActiveTimeThreshold};
use crate::backend::PropertySource;
use crate::error::BackendError;

#[derive(Debug, Clone)]
pub struct SnapshotScheduler {
    clock: ActiveTimeClock,
}

impl SnapshotScheduler {
    pub fn new(interval: Duration, elapsed: Duration) -> Self {
        Self { clock: ActiveTimeClock::new(interval, elapsed) }
    }

    pub fn interval(&self) -> Duration {
        self.clock.interval()
    }

    pub fn threshold(&self, elapsed: Duration) -> ActiveTimeThreshold {
        self.clock.threshold(elapsed)
    }

    /// Active time left before the next automatic snapshot.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.clock.remaining(elapsed)
    }

    /// If the threshold was reached, advance it by whole intervals past
    /// `elapsed` and return the reached value. Targets missed by a late poll
    /// collapse into this one firing. The caller then captures and persists.
    pub fn poll(&mut self, elapsed: Duration) -> Option<Duration> {
        let reached = self.clock.poll(elapsed)?;
        let interval = self.clock.interval();
        let mut next = reached + interval;
        while next <= elapsed {
            next += interval;
        }
        self.clock.set_next_target(next);
        debug!(reached = ?reached, next = ?next, "snapshot threshold reached");
        Some(reached)
    }

    pub fn reset_for_switch(&mut self, elapsed: Duration) {
        self.clock.reset_for_switch(elapsed);
    }
}

/// Build the create-version payload from the live state and the table
/// layer's property getters.
pub fn capture(
    document: &Document,
    state: &EditableState,
    properties: &dyn PropertySource,
) -> Result<CreateVersionRequest, BackendError> {
    let property_list = properties.properties(document.workspace_id, document.id);
    let property_values = properties.property_values(document.workspace_id, document.id);

    Ok(CreateVersionRequest {
        title: state.title.clone(),
        view_type: document.view_type,
        title_width: document.title_width,
        content: document.view_type.carries_content().then(|| state.content.clone()),
        properties_json: serde_json::to_string(&property_list)?,
        property_values_json: serde_json::to_string(&property_values)?,
    })
}
