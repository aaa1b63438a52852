use crate::calendar::{Timestamp, TradingCalendar};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCheck {
    /// `boundary` has been reached and was not acted upon yet.
    Closed(Timestamp),
    Pending,
}

impl CloseCheck {
    pub fn is_closed(&self) -> bool {
        matches!(self, CloseCheck::Closed(_))
    }

    pub fn boundary(&self) -> Option<Timestamp> {
        match self {
            CloseCheck::Closed(b) => Some(*b),
            CloseCheck::Pending => None,
        }
    }
}

/// Decide whether a candle has closed since `last_acted`.
///
/// Without a previous boundary the current one fires immediately, which seeds
/// the tracker on the first poll after startup. Otherwise only the single
/// boundary following `last_acted` is considered, so a long gap is caught up
/// one boundary per poll. Nothing is committed here.
pub fn poll_for_close(
    last_acted: Option<Timestamp>,
    now: &Timestamp,
    calendar: &TradingCalendar,
) -> CloseCheck {
    let Some(last) = last_acted else {
        return match calendar.current_boundary(now) {
            Some(current) if current <= *now => CloseCheck::Closed(current),
            _ => CloseCheck::Pending,
        };
    };

    match calendar.next_boundary(&last) {
        Some(next) if *now >= next => CloseCheck::Closed(next),
        _ => CloseCheck::Pending,
    }
}
