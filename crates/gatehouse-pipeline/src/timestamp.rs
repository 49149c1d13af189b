//! Device timestamp sanitisation.
//!
//! Device clocks drift and some readers send nothing at all. A timestamp that
//! is missing, unparseable, before 2000-01-01 or more than a day ahead of the
//! server is replaced with the server's own clock.

use chrono::{DateTime, Duration, Utc};

/// 2000-01-01T00:00:00Z.
const EARLIEST_PLAUSIBLE: i64 = 946_684_800;

const MAX_FUTURE_SKEW_HOURS: i64 = 24;

pub fn sanitize_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
  let Some(parsed) = raw.and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
  else {
    return now;
  };
  let ts = parsed.with_timezone(&Utc);
  if ts.timestamp() < EARLIEST_PLAUSIBLE
    || ts > now + Duration::hours(MAX_FUTURE_SKEW_HOURS)
  {
    tracing::debug!(%ts, "implausible device timestamp; using server time");
    return now;
  }
  ts
}
