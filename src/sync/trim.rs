// ABOUTME: Retention trimming - drops points older than the per-period cutoff
// ABOUTME: Idempotent; a zero-day retention means unlimited and never trims

use chrono::{DateTime, Duration, Utc};

use crate::retention::{Period, RetentionTable};
use crate::source::models::Signal;

/// Drop points strictly before `last_point − max_days` and return how many
/// were removed. Unlimited retention (0 days) never trims. The cutoff
/// saturates at the minimum representable instant instead of underflowing.
pub fn trim_to_retention(signal: &mut Signal, period: Period, retention: &RetentionTable) -> usize {
    let max_days = retention.max_days(period);
    if max_days == 0 {
        return 0;
    }
    let last = match signal.last_timestamp() {
        Some(last) => last,
        None => return 0,
    };
    let cutoff = last
        .checked_sub_signed(Duration::days(i64::from(max_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let before = signal.points.len();
    signal.points.retain(|p| p.timestamp >= cutoff);
    let trimmed = before - signal.points.len();
    if trimmed > 0 {
        tracing::debug!(
            "Trimmed {} points before {} from series {}",
            trimmed,
            cutoff,
            signal.series_id
        );
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::models::Point;
    use chrono::TimeZone;

    fn daily_signal(days: i64) -> Signal {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let points = (0..days)
            .map(|i| Point {
                timestamp: start + Duration::days(i),
                value: Some(i as f64),
                qualifiers: Vec::new(),
            })
            .collect();
        Signal::new("ts-1".to_string(), points, None, Utc::now())
    }

    fn table(days: u32) -> RetentionTable {
        let mut table = RetentionTable::default();
        table.set(Period::Daily, days);
        table
    }

    #[test]
    fn test_trim_drops_points_before_cutoff() {
        let mut signal = daily_signal(100);
        let trimmed = trim_to_retention(&mut signal, Period::Daily, &table(30));
        assert_eq!(trimmed, 69);
        assert_eq!(signal.point_count(), 31);
        // Cutoff itself is kept (strictly-before semantics).
        let last = signal.last_timestamp().unwrap();
        assert_eq!(signal.first_timestamp().unwrap(), last - Duration::days(30));
    }

    #[test]
    fn test_trim_is_idempotent() {
        let mut signal = daily_signal(100);
        trim_to_retention(&mut signal, Period::Daily, &table(30));
        let after_first = signal.point_count();
        let second = trim_to_retention(&mut signal, Period::Daily, &table(30));
        assert_eq!(second, 0);
        assert_eq!(signal.point_count(), after_first);
    }

    #[test]
    fn test_unlimited_retention_never_trims() {
        let mut signal = daily_signal(10_000);
        let trimmed = trim_to_retention(&mut signal, Period::Daily, &table(0));
        assert_eq!(trimmed, 0);
        assert_eq!(signal.point_count(), 10_000);
    }

    #[test]
    fn test_empty_signal_is_a_noop() {
        let mut signal = Signal::new("ts-1".to_string(), Vec::new(), None, Utc::now());
        assert_eq!(trim_to_retention(&mut signal, Period::Daily, &table(30)), 0);
    }

    #[test]
    fn test_cutoff_saturates_near_time_minimum() {
        let mut signal = Signal::new(
            "ts-1".to_string(),
            vec![Point {
                timestamp: DateTime::<Utc>::MIN_UTC + Duration::days(1),
                value: Some(1.0),
                qualifiers: Vec::new(),
            }],
            None,
            Utc::now(),
        );
        let trimmed = trim_to_retention(&mut signal, Period::Daily, &table(400));
        assert_eq!(trimmed, 0);
        assert_eq!(signal.point_count(), 1);
    }
}
