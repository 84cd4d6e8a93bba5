use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum TimeError {
    #[error("invalid cron expression '{expression}': {source}")]
    InvalidCron {
        expression: String,
        source: cron::error::Error,
    },

    #[error("unknown time zone '{0}'")]
    InvalidTimeZone(String),
}

/// Parse an IANA time zone name (e.g. `America/Sao_Paulo`).
pub fn parse_time_zone(name: &str) -> Result<Tz, TimeError> {
    name.parse::<Tz>()
        .map_err(|_| TimeError::InvalidTimeZone(name.to_string()))
}

/// Parse a standard 5-field cron expression. The underlying schedule
/// type wants a seconds field, so one is prepended when missing.
pub fn parse_cron(expression: &str) -> Result<Schedule, TimeError> {
    let fields = expression.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };
    Schedule::from_str(&normalized).map_err(|source| TimeError::InvalidCron {
        expression: expression.to_string(),
        source,
    })
}

/// Whether the schedule fires at some instant in `(last_trigger, now]`,
/// evaluated in the given zone.
pub fn is_triggered(
    schedule: &Schedule,
    time_zone: Tz,
    last_trigger: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    schedule
        .after(&last_trigger.with_timezone(&time_zone))
        .next()
        .is_some_and(|next| next.with_timezone(&Utc) <= now)
}

/// Seconds until the next fire instant after `now`, rounded up.
pub fn time_until_next_trigger(schedule: &Schedule, time_zone: Tz, now: DateTime<Utc>) -> u64 {
    match schedule.after(&now.with_timezone(&time_zone)).next() {
        Some(next) => {
            let millis = (next.with_timezone(&Utc) - now).num_milliseconds().max(0);
            (millis as u64).div_ceil(1000)
        }
        None => 0,
    }
}

/// Seconds elapsed since `timestamp`, or -1 when it is unset.
pub fn time_since(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match timestamp {
        Some(ts) => (now - ts).num_seconds(),
        None => -1,
    }
}
