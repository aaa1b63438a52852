use crate::calendar::Timestamp;

/// Last boundary acted upon for one instrument. Lives as long as the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingState {
    last_acted: Option<Timestamp>,
}

impl TrackingState {
    pub fn last_acted(&self) -> Option<Timestamp> {
        self.last_acted
    }

    /// Commit `boundary` as acted upon. Returns `false` and leaves the state
    /// untouched if `boundary` is not strictly after the current one.
    pub fn advance(&mut self, boundary: Timestamp) -> bool {
        if let Some(last) = self.last_acted {
            if boundary <= last {
                return false;
            }
        }
        self.last_acted = Some(boundary);
        true
    }
}
