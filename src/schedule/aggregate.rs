use serde::{Deserialize, Serialize};

use super::time::MINUTES_PER_DAY;

/// Month totals for one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowTotals {
    pub total_minutes: u32,
    pub shift_units: u32,
}

/// Rostered slots a single day contributes.
///
/// A full day or longer counts as two slots; any other recorded span,
/// including a zero-length one, counts as one.
pub fn shift_units(span: Option<u32>) -> u32 {
    match span {
        None => 0,
        Some(minutes) if minutes >= MINUTES_PER_DAY => 2,
        Some(_) => 1,
    }
}

pub fn aggregate<I>(spans: I) -> RowTotals
where
    I: IntoIterator<Item = Option<u32>>,
{
    spans.into_iter().fold(RowTotals::default(), |acc, span| RowTotals {
        total_minutes: acc.total_minutes + span.unwrap_or(0),
        shift_units: acc.shift_units + shift_units(span),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_row() {
        let totals = aggregate([Some(480), Some(1440), None]);
        assert_eq!(totals.total_minutes, 1920);
        assert_eq!(totals.shift_units, 3);
    }

    #[test]
    fn test_zero_length_shift_still_counts() {
        let totals = aggregate([Some(0)]);
        assert_eq!(totals.total_minutes, 0);
        assert_eq!(totals.shift_units, 1);
    }

    #[test]
    fn test_double_shift_counts_two() {
        assert_eq!(shift_units(Some(1500)), 2);
        assert_eq!(shift_units(Some(1439)), 1);
    }

    #[test]
    fn test_empty_row() {
        assert_eq!(aggregate(Vec::<Option<u32>>::new()), RowTotals::default());
        assert_eq!(aggregate([None, None]), RowTotals::default());
    }
}
