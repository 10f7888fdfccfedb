//! Temporal consistency (spec.md §4.5.3): columns tagged as temporal get a
//! monotonic / seasonal / random-jitter treatment. Since the core never
//! holds the caller's original sample once a job is running (only its
//! derived [`goc_protocol::DatasetDescriptor`]), "patterns extracted from
//! the original sample" narrows to what the descriptor already captures:
//! a `value_range` on a date/datetime column bounds a monotonic or seasonal
//! walk; its absence falls back to jitter around the current time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use goc_protocol::{Column, LogicalType};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalPattern {
    /// Strictly increasing with row index — e.g. `created_at` sequences.
    Monotonic,
    /// Cycles across a 12-month period — e.g. seasonal demand timestamps.
    Seasonal,
    /// Uniform jitter around a base instant.
    RandomJitter,
}

/// Picks a pattern by column name heuristic: names suggesting an ordering
/// event (`created`, `updated`, `timestamp`) get `Monotonic`; names
/// suggesting a recurring calendar event (`season`, `month`, `renewal`) get
/// `Seasonal`; anything else gets `RandomJitter`.
pub fn pattern_for(column: &Column) -> TemporalPattern {
    let name = column.name.to_ascii_lowercase();
    if name.contains("created") || name.contains("updated") || name.contains("timestamp") {
        TemporalPattern::Monotonic
    } else if name.contains("season") || name.contains("month") || name.contains("renewal") {
        TemporalPattern::Seasonal
    } else {
        TemporalPattern::RandomJitter
    }
}

pub fn is_temporal(column: &Column) -> bool {
    matches!(column.logical_type, LogicalType::Date | LogicalType::DateTime)
}

/// Computes the timestamp for row `index` of `total_rows`, anchored at
/// `base` and bounded by `range` (if the column declares a `value_range`,
/// interpreted as Unix-epoch seconds).
pub fn apply_pattern(
    pattern: TemporalPattern,
    base: DateTime<Utc>,
    index: usize,
    total_rows: usize,
    range: Option<(f64, f64)>,
    rng: &mut impl Rng,
) -> DateTime<Utc> {
    match pattern {
        TemporalPattern::Monotonic => match range {
            Some((lo, hi)) if total_rows > 1 => {
                let span = hi - lo;
                let step = span * (index as f64) / ((total_rows - 1) as f64);
                epoch_seconds(lo + step)
            }
            _ => base + Duration::seconds(index as i64 * 60),
        },
        TemporalPattern::Seasonal => {
            let month_offset = (index % 12) as i64;
            base + Duration::days(month_offset * 30)
        }
        TemporalPattern::RandomJitter => {
            let jitter_secs = rng.gen_range(-86_400i64..=86_400i64);
            base + Duration::seconds(jitter_secs)
        }
    }
}

fn epoch_seconds(seconds: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds as i64, 0).single().unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_protocol::Column;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn created_at_columns_are_monotonic() {
        let column = Column::required("created_at", LogicalType::DateTime);
        assert_eq!(pattern_for(&column), TemporalPattern::Monotonic);
    }

    #[test]
    fn unnamed_temporal_column_falls_back_to_jitter() {
        let column = Column::required("event_at", LogicalType::DateTime);
        assert_eq!(pattern_for(&column), TemporalPattern::RandomJitter);
    }

    #[test]
    fn monotonic_with_range_increases_across_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = Utc::now();
        let range = Some((0.0, 1_000_000.0));
        let first = apply_pattern(TemporalPattern::Monotonic, base, 0, 10, range, &mut rng);
        let last = apply_pattern(TemporalPattern::Monotonic, base, 9, 10, range, &mut rng);
        assert!(last > first);
    }

    #[test]
    fn seasonal_pattern_cycles_every_twelve_rows() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = Utc::now();
        let a = apply_pattern(TemporalPattern::Seasonal, base, 0, 24, None, &mut rng);
        let b = apply_pattern(TemporalPattern::Seasonal, base, 12, 24, None, &mut rng);
        assert_eq!(a, b);
    }

    #[test]
    fn non_temporal_logical_types_are_excluded() {
        let column = Column::required("age", LogicalType::Integer);
        assert!(!is_temporal(&column));
    }
}
