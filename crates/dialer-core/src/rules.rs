//! Calling-rule enforcement
//!
//! Before any call is placed the worker checks, in order: allowed weekday
//! in the campaign's timezone, time-of-day window (end inclusive), tenant
//! concurrency ceiling, and per-lead cooldown. The first violated rule
//! names the skip reason; the reason decides how long the job is deferred.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{DialerError, DialerResult};

/// Why a call was not allowed right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Today is masked out
    WeekdayNotAllowed,
    /// Local time is outside the calling window
    OutsideTimeWindow,
    /// Tenant/campaign already at its concurrency ceiling
    ConcurrentLimitReached,
    /// The lead was called too recently
    CooldownNotElapsed,
}

/// When and how often a campaign may dial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallingRules {
    /// Window opening, local time
    pub time_window_start: NaiveTime,
    /// Window closing, local time, inclusive
    pub time_window_end: NaiveTime,
    /// IANA timezone the window is evaluated in
    pub timezone: String,
    /// Bitmask of allowed weekdays, bit 0 = Monday through bit 6 = Sunday
    pub allowed_weekdays: u8,
    /// Concurrency ceiling per (tenant, campaign)
    pub max_concurrent_calls: u32,
    /// Base delay before retrying a retryable outcome
    pub retry_delay_seconds: u64,
    /// Attempt budget per job
    pub max_retry_attempts: u32,
    /// Minimum gap between calls to the same lead
    pub min_hours_between_calls: u32,
}

impl Default for CallingRules {
    fn default() -> Self {
        Self {
            time_window_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_window_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            timezone: "America/New_York".to_string(),
            allowed_weekdays: 0b0001_1111, // Monday through Friday
            max_concurrent_calls: 5,
            retry_delay_seconds: 1800,
            max_retry_attempts: 3,
            min_hours_between_calls: 4,
        }
    }
}

impl CallingRules {
    /// Parse the configured timezone.
    pub fn tz(&self) -> DialerResult<Tz> {
        Tz::from_str(&self.timezone).map_err(|_| DialerError::InvalidTimezone {
            tz: self.timezone.clone(),
        })
    }

    fn weekday_allowed(&self, weekday: chrono::Weekday) -> bool {
        self.allowed_weekdays & (1 << weekday.num_days_from_monday()) != 0
    }

    /// Whether `instant` falls on an allowed weekday inside the window.
    pub fn in_window(&self, instant: DateTime<Utc>) -> DialerResult<Result<(), SkipReason>> {
        let tz = self.tz()?;
        let local = instant.with_timezone(&tz);
        if !self.weekday_allowed(local.weekday()) {
            return Ok(Err(SkipReason::WeekdayNotAllowed));
        }
        let time = local.time();
        // End bound is inclusive: a job dequeued exactly at close still runs
        if time < self.time_window_start || time > self.time_window_end {
            return Ok(Err(SkipReason::OutsideTimeWindow));
        }
        Ok(Ok(()))
    }

    /// First instant at or after `from` that satisfies weekday and window.
    pub fn next_window_start(&self, from: DateTime<Utc>) -> DialerResult<DateTime<Utc>> {
        let tz = self.tz()?;
        let local = from.with_timezone(&tz);

        for day_offset in 0..8 {
            let date = (local + Duration::days(day_offset)).date_naive();
            let weekday = date.weekday();
            if !self.weekday_allowed(weekday) {
                continue;
            }
            if day_offset == 0 {
                let time = local.time();
                if time >= self.time_window_start && time <= self.time_window_end {
                    return Ok(from);
                }
                if time > self.time_window_end {
                    continue;
                }
            }
            let naive = date.and_time(self.time_window_start);
            if let Some(instant) = tz.from_local_datetime(&naive).earliest() {
                return Ok(instant.with_timezone(&Utc));
            }
        }
        // Mask had no allowed day in a full week; treat as one week out
        Ok(from + Duration::days(7))
    }

    /// Non-negative seconds until the next open window.
    pub fn delay_until_next_window(&self, from: DateTime<Utc>) -> DialerResult<u64> {
        let next = self.next_window_start(from)?;
        Ok((next - from).num_seconds().max(0) as u64)
    }
}

/// Live count of active calls per (tenant, campaign).
///
/// Incremented when a call is placed and decremented on every path that
/// terminates one; the worker refuses new calls at the ceiling.
#[derive(Default)]
pub struct ActiveCallTracker {
    counts: Mutex<HashMap<(String, String), u32>>,
}

impl ActiveCallTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a placed call.
    pub fn register_call_start(&self, tenant_id: &str, campaign_id: &str) {
        let mut counts = self.counts.lock();
        *counts
            .entry((tenant_id.to_string(), campaign_id.to_string()))
            .or_insert(0) += 1;
    }

    /// Record a terminated call, on any termination path.
    pub fn register_call_end(&self, tenant_id: &str, campaign_id: &str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&(tenant_id.to_string(), campaign_id.to_string())) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&(tenant_id.to_string(), campaign_id.to_string()));
            }
        }
    }

    /// Current active calls for a (tenant, campaign)
    pub fn active_count(&self, tenant_id: &str, campaign_id: &str) -> u32 {
        self.counts
            .lock()
            .get(&(tenant_id.to_string(), campaign_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

/// Evaluate every rule for one prospective call.
pub fn can_make_call(
    tracker: &ActiveCallTracker,
    tenant_id: &str,
    campaign_id: &str,
    rules: &CallingRules,
    lead_last_called_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DialerResult<Result<(), SkipReason>> {
    if let Err(reason) = rules.in_window(now)? {
        return Ok(Err(reason));
    }

    if tracker.active_count(tenant_id, campaign_id) >= rules.max_concurrent_calls {
        return Ok(Err(SkipReason::ConcurrentLimitReached));
    }

    if let Some(last) = lead_last_called_at {
        let cooldown = Duration::hours(rules.min_hours_between_calls as i64);
        if now - last < cooldown {
            return Ok(Err(SkipReason::CooldownNotElapsed));
        }
    }

    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn utc_rules() -> CallingRules {
        CallingRules {
            timezone: "UTC".to_string(),
            ..Default::default()
        }
    }

    /// 2026-07-29 is a Wednesday
    fn wednesday_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 7, 29)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
    }

    /// 2026-08-01 is a Saturday
    fn saturday_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 8, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
    }

    #[test]
    fn weekday_inside_window_is_allowed() {
        let rules = utc_rules();
        assert_eq!(rules.in_window(wednesday_at(10, 30)).unwrap(), Ok(()));
    }

    #[test]
    fn window_end_is_inclusive() {
        let rules = utc_rules();
        assert_eq!(rules.in_window(wednesday_at(17, 0)).unwrap(), Ok(()));
        assert_eq!(
            rules.in_window(wednesday_at(17, 1)).unwrap(),
            Err(SkipReason::OutsideTimeWindow)
        );
    }

    #[test]
    fn early_morning_is_outside_window() {
        let rules = utc_rules();
        assert_eq!(
            rules.in_window(wednesday_at(8, 59)).unwrap(),
            Err(SkipReason::OutsideTimeWindow)
        );
    }

    #[test]
    fn weekend_is_masked_out() {
        let rules = utc_rules();
        assert_eq!(
            rules.in_window(saturday_at(10, 0)).unwrap(),
            Err(SkipReason::WeekdayNotAllowed)
        );
    }

    #[test]
    fn next_window_same_day_before_open() {
        let rules = utc_rules();
        let next = rules.next_window_start(wednesday_at(7, 0)).unwrap();
        assert_eq!(next, wednesday_at(9, 0));
    }

    #[test]
    fn next_window_inside_window_is_now() {
        let rules = utc_rules();
        let now = wednesday_at(12, 0);
        assert_eq!(rules.next_window_start(now).unwrap(), now);
        assert_eq!(rules.delay_until_next_window(now).unwrap(), 0);
    }

    #[test]
    fn next_window_after_close_is_tomorrow() {
        let rules = utc_rules();
        let next = rules.next_window_start(wednesday_at(20, 5)).unwrap();
        // Thursday 09:00
        let expected = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 7, 30)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        assert_eq!(next, expected);
    }

    #[test]
    fn next_window_skips_weekend() {
        let rules = utc_rules();
        let next = rules.next_window_start(saturday_at(10, 0)).unwrap();
        // Monday 2026-08-03 09:00
        let expected = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 8, 3)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        assert_eq!(next, expected);
    }

    #[test]
    fn timezone_shifts_the_window() {
        let rules = CallingRules {
            timezone: "America/Chicago".to_string(),
            ..Default::default()
        };
        // 15:00 UTC on a Wednesday is 10:00 in Chicago (CDT): allowed
        assert_eq!(rules.in_window(wednesday_at(15, 0)).unwrap(), Ok(()));
        // 13:00 UTC is 08:00 in Chicago: before the window opens
        assert_eq!(
            rules.in_window(wednesday_at(13, 0)).unwrap(),
            Err(SkipReason::OutsideTimeWindow)
        );
    }

    #[test]
    fn bad_timezone_is_an_error() {
        let rules = CallingRules {
            timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(rules.in_window(wednesday_at(10, 0)).is_err());
    }

    #[test]
    fn concurrency_ceiling_blocks_calls() {
        let rules = CallingRules {
            timezone: "UTC".to_string(),
            max_concurrent_calls: 2,
            ..Default::default()
        };
        let tracker = ActiveCallTracker::new();
        let now = wednesday_at(10, 0);

        assert_eq!(
            can_make_call(&tracker, "t1", "c1", &rules, None, now).unwrap(),
            Ok(())
        );
        tracker.register_call_start("t1", "c1");
        tracker.register_call_start("t1", "c1");
        assert_eq!(
            can_make_call(&tracker, "t1", "c1", &rules, None, now).unwrap(),
            Err(SkipReason::ConcurrentLimitReached)
        );

        // Other campaigns are unaffected
        assert_eq!(
            can_make_call(&tracker, "t1", "c2", &rules, None, now).unwrap(),
            Ok(())
        );

        tracker.register_call_end("t1", "c1");
        assert_eq!(
            can_make_call(&tracker, "t1", "c1", &rules, None, now).unwrap(),
            Ok(())
        );
    }

    #[test]
    fn cooldown_blocks_recent_leads() {
        let rules = utc_rules();
        let tracker = ActiveCallTracker::new();
        let now = wednesday_at(12, 0);

        let two_hours_ago = now - Duration::hours(2);
        assert_eq!(
            can_make_call(&tracker, "t1", "c1", &rules, Some(two_hours_ago), now).unwrap(),
            Err(SkipReason::CooldownNotElapsed)
        );

        let five_hours_ago = now - Duration::hours(5);
        assert_eq!(
            can_make_call(&tracker, "t1", "c1", &rules, Some(five_hours_ago), now).unwrap(),
            Ok(())
        );
    }

    #[test]
    fn call_end_is_idempotent_at_zero() {
        let tracker = ActiveCallTracker::new();
        tracker.register_call_end("t1", "c1");
        assert_eq!(tracker.active_count("t1", "c1"), 0);
    }
}
