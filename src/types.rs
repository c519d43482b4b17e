use crate::constants::{MATCHABLE_RANKS, REASON_HIGHER_RANK, REASON_NOT_IN_REFERENCE};

/// Scientific-name identifier shared by observations, the reference list and NorTaxa.
pub type TaxonId = i64;

/// Parses an integer cell leniently.
///
/// Exports that passed through a spreadsheet often carry integral floats ("42.0"),
/// so those are accepted as long as they have no fractional part.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Some(value as i64)
        }
        _ => None,
    }
}

/// Whether a rank label is one the reference list is expected to contain.
pub fn is_matchable_rank(rank: &str) -> bool {
    let rank = rank.trim();
    MATCHABLE_RANKS.iter().any(|r| r.eq_ignore_ascii_case(rank))
}

/// Per-row result of the criteria join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Species/subspecies row with a reference entry.
    Matched,
    /// Row above species level; logged whether or not it matched.
    RankExcluded,
    /// Species/subspecies row with no reference entry.
    Unmatched,
}

impl MatchOutcome {
    pub fn classify(rank: &str, matched: bool) -> Self {
        if !is_matchable_rank(rank) {
            MatchOutcome::RankExcluded
        } else if matched {
            MatchOutcome::Matched
        } else {
            MatchOutcome::Unmatched
        }
    }

    pub fn log_reason(&self) -> Option<LogReason> {
        match self {
            MatchOutcome::Matched => None,
            MatchOutcome::RankExcluded => Some(LogReason::HigherRank),
            MatchOutcome::Unmatched => Some(LogReason::NotInReference),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogReason {
    HigherRank,
    NotInReference,
}

impl LogReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogReason::HigherRank => REASON_HIGHER_RANK,
            LogReason::NotInReference => REASON_NOT_IN_REFERENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_accepts_integral_floats() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer(" 42 "), Some(42));
        assert_eq!(parse_integer("42.0"), Some(42));
        assert_eq!(parse_integer("42.5"), None);
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("abc"), None);
        assert_eq!(parse_integer("NaN"), None);
    }

    #[test]
    fn test_classify_outcomes() {
        assert_eq!(MatchOutcome::classify("species", true), MatchOutcome::Matched);
        assert_eq!(MatchOutcome::classify("subspecies", false), MatchOutcome::Unmatched);
        assert_eq!(MatchOutcome::classify("genus", true), MatchOutcome::RankExcluded);
        assert_eq!(MatchOutcome::classify("", false), MatchOutcome::RankExcluded);
        assert_eq!(MatchOutcome::Matched.log_reason(), None);
        assert_eq!(
            MatchOutcome::RankExcluded.log_reason().map(|r| r.as_str()),
            Some("Higher taxonomic rank")
        );
    }
}
