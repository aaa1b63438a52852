use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Weekday,
};
use chrono_tz::Tz;

use crate::error::AppError;

pub type Timestamp = DateTime<Tz>;

const SECONDS_PER_DAY: i64 = 86_400;
// A week plus one day covers any run of non-trading weekdays.
const MAX_SESSION_LOOKAHEAD_DAYS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    RoundTheClock,
    Sessions {
        trading_days: [bool; 7],
        open: NaiveTime,
        close: NaiveTime,
    },
}

/// Trading-hours policy of one market: which days trade, the daily session
/// (if any), and the candle grid.
///
/// Methods never read the clock. Inputs are converted into the calendar's
/// zone before any comparison and results are returned in that zone.
///
/// The grid is anchored to local midnight plus `anchor`, not to the session
/// open, so a 4-hour grid closes at the same clock marks every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingCalendar {
    tz: Tz,
    schedule: Schedule,
    period_secs: i64,
    anchor_secs: i64,
}

impl TradingCalendar {
    /// A market trading inside `[open, close]` on the given weekdays.
    pub fn with_sessions(
        tz: Tz,
        trading_days: &[Weekday],
        open: NaiveTime,
        close: NaiveTime,
        period: TimeDelta,
        anchor: TimeDelta,
    ) -> Result<Self, AppError> {
        if open >= close {
            return Err(AppError::Config(format!(
                "session open {} must be before close {}",
                open, close
            )));
        }
        let mut days = [false; 7];
        for day in trading_days {
            days[day.num_days_from_monday() as usize] = true;
        }
        Self::build(
            tz,
            Schedule::Sessions {
                trading_days: days,
                open,
                close,
            },
            period,
            anchor,
        )
    }

    /// A market without sessions: every day trades, every grid mark is a close.
    pub fn round_the_clock(
        tz: Tz,
        period: TimeDelta,
        anchor: TimeDelta,
    ) -> Result<Self, AppError> {
        Self::build(tz, Schedule::RoundTheClock, period, anchor)
    }

    fn build(
        tz: Tz,
        schedule: Schedule,
        period: TimeDelta,
        anchor: TimeDelta,
    ) -> Result<Self, AppError> {
        if period.subsec_nanos() != 0 || anchor.subsec_nanos() != 0 {
            return Err(AppError::Config(
                "candle period and grid anchor must be whole seconds".to_string(),
            ));
        }
        let period_secs = period.num_seconds();
        if period_secs <= 0 || SECONDS_PER_DAY % period_secs != 0 {
            return Err(AppError::Config(format!(
                "candle period of {}s must be positive and divide a day evenly",
                period_secs
            )));
        }
        Ok(Self {
            tz,
            schedule,
            period_secs,
            anchor_secs: anchor.num_seconds().rem_euclid(period_secs),
        })
    }

    /// NSE equities: Monday to Friday, 09:15 to 15:30, 15-minute candles on the
    /// quarter hour.
    pub fn nse(tz: Tz) -> Self {
        let open = NaiveTime::from_hms_opt(9, 15, 0).expect("static NSE open");
        let close = NaiveTime::from_hms_opt(15, 30, 0).expect("static NSE close");
        Self::with_sessions(
            tz,
            &[
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            open,
            close,
            TimeDelta::minutes(15),
            TimeDelta::zero(),
        )
        .expect("static NSE session")
    }

    /// Crypto 4-hour candles on the UTC grid: 00:00, 04:00, ..., 20:00 UTC
    /// (01:30, 05:30, ..., 21:30 in IST).
    pub fn crypto_4h() -> Self {
        Self {
            tz: chrono_tz::UTC,
            schedule: Schedule::RoundTheClock,
            period_secs: 4 * 3600,
            anchor_secs: 0,
        }
    }

    pub fn period(&self) -> TimeDelta {
        TimeDelta::seconds(self.period_secs)
    }

    pub fn is_trading_day(&self, ts: &Timestamp) -> bool {
        self.is_trading_date(self.local(ts).date())
    }

    /// Open and close instants of the local date of `ts`; `None` on
    /// non-trading days and for calendars without sessions.
    pub fn session_window(&self, ts: &Timestamp) -> Option<(Timestamp, Timestamp)> {
        let Schedule::Sessions { open, close, .. } = self.schedule else {
            return None;
        };
        let date = self.local(ts).date();
        if !self.is_trading_date(date) {
            return None;
        }
        Some((
            self.localize(date.and_time(open))?,
            self.localize(date.and_time(close))?,
        ))
    }

    /// True iff `ts` falls inside `[open, close]` on a trading day.
    pub fn is_market_open(&self, ts: &Timestamp) -> bool {
        match self.schedule {
            Schedule::RoundTheClock => true,
            Schedule::Sessions { .. } => self
                .session_window(ts)
                .map(|(open, close)| open <= *ts && *ts <= close)
                .unwrap_or(false),
        }
    }

    /// Most recent grid mark at or before `ts`.
    ///
    /// With sessions, `None` outside `[open, close]` and when the floored mark
    /// would precede the open.
    pub fn current_boundary(&self, ts: &Timestamp) -> Option<Timestamp> {
        let local = self.local(ts);
        let floored = self.floor_to_grid(local);
        match self.schedule {
            Schedule::RoundTheClock => self.localize(floored),
            Schedule::Sessions { open, .. } => {
                if !self.is_market_open(ts) {
                    return None;
                }
                if floored.date() != local.date() || floored.time() < open {
                    return None;
                }
                self.localize(floored)
            }
        }
    }

    /// First candle close strictly after the current boundary of `ts`.
    ///
    /// With sessions, a mark past the close is never produced; after the last
    /// in-session mark (or while closed) this is the first mark of the next
    /// session, skipping non-trading days. `None` only when the calendar has
    /// no trading day within a week.
    pub fn next_boundary(&self, ts: &Timestamp) -> Option<Timestamp> {
        let local = self.local(ts);
        match self.schedule {
            Schedule::RoundTheClock => {
                let period = self.period();
                let mut candidate = self.floor_to_grid(local) + period;
                // A mark that falls in a DST gap does not exist locally.
                for _ in 0..3 {
                    if let Some(boundary) = self.localize(candidate) {
                        return Some(boundary);
                    }
                    candidate += period;
                }
                None
            }
            Schedule::Sessions { close, .. } => {
                if let Some(current) = self.current_boundary(ts) {
                    let current = current.naive_local();
                    let candidate = current + self.period();
                    if candidate.date() == current.date() && candidate.time() <= close {
                        return self.localize(candidate);
                    }
                }
                self.first_session_boundary_after(local)
            }
        }
    }

    fn first_session_boundary_after(&self, local: NaiveDateTime) -> Option<Timestamp> {
        let Schedule::Sessions { open, close, .. } = self.schedule else {
            return None;
        };
        for offset in 0..=MAX_SESSION_LOOKAHEAD_DAYS {
            let date = local.date().checked_add_signed(TimeDelta::days(offset))?;
            if !self.is_trading_date(date) {
                continue;
            }
            let first = self.ceil_to_grid(date.and_time(open));
            if first.date() != date || first.time() > close || first <= local {
                continue;
            }
            if let Some(boundary) = self.localize(first) {
                return Some(boundary);
            }
        }
        None
    }

    fn is_trading_date(&self, date: NaiveDate) -> bool {
        match self.schedule {
            Schedule::RoundTheClock => true,
            Schedule::Sessions { trading_days, .. } => {
                trading_days[date.weekday().num_days_from_monday() as usize]
            }
        }
    }

    fn local(&self, ts: &Timestamp) -> NaiveDateTime {
        ts.with_timezone(&self.tz).naive_local()
    }

    fn localize(&self, local: NaiveDateTime) -> Option<Timestamp> {
        self.tz.from_local_datetime(&local).earliest()
    }

    fn floor_to_grid(&self, local: NaiveDateTime) -> NaiveDateTime {
        let secs = i64::from(local.num_seconds_from_midnight());
        let offset = (secs - self.anchor_secs).rem_euclid(self.period_secs);
        local.date().and_time(NaiveTime::MIN) + TimeDelta::seconds(secs - offset)
    }

    fn ceil_to_grid(&self, local: NaiveDateTime) -> NaiveDateTime {
        let floored = self.floor_to_grid(local);
        if floored < local {
            floored + self.period()
        } else {
            floored
        }
    }
}
