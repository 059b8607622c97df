//! Row-key filters for scans within one partition.

use std::ops::Bound;

/// Which row keys of a partition a scan returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowFilter {
    /// Every row in the partition.
    All,
    /// Exactly one row key.
    Eq(String),
    /// Row keys within the given bounds (string order).
    Range {
        lower: Bound<String>,
        upper: Bound<String>,
    },
    /// Row keys matching at least one of the filters.
    Any(Vec<RowFilter>),
}

impl RowFilter {
    /// Row keys strictly between `lower` and `upper`.
    pub fn between(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Self::Range {
            lower: Bound::Excluded(lower.into()),
            upper: Bound::Excluded(upper.into()),
        }
    }

    /// Row keys in `[lower, upper)`.
    pub fn from_until(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Self::Range {
            lower: Bound::Included(lower.into()),
            upper: Bound::Excluded(upper.into()),
        }
    }

    /// `self OR other`.
    pub fn or(self, other: RowFilter) -> Self {
        match self {
            Self::Any(mut filters) => {
                filters.push(other);
                Self::Any(filters)
            }
            first => Self::Any(vec![first, other]),
        }
    }

    pub fn matches(&self, row_key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Eq(key) => key == row_key,
            Self::Range { lower, upper } => {
                let above = match lower {
                    Bound::Included(l) => row_key >= l.as_str(),
                    Bound::Excluded(l) => row_key > l.as_str(),
                    Bound::Unbounded => true,
                };
                let below = match upper {
                    Bound::Included(u) => row_key <= u.as_str(),
                    Bound::Excluded(u) => row_key < u.as_str(),
                    Bound::Unbounded => true,
                };
                above && below
            }
            Self::Any(filters) => filters.iter().any(|f| f.matches(row_key)),
        }
    }
}

/// A scan over one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub partition_key: String,
    pub rows: RowFilter,
}

impl Query {
    pub fn new(partition_key: impl Into<String>, rows: RowFilter) -> Self {
        Self {
            partition_key: partition_key.into(),
            rows,
        }
    }

    /// Every row of a partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self::new(partition_key, RowFilter::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_matches_only_itself() {
        let f = RowFilter::Eq("a".into());
        assert!(f.matches("a"));
        assert!(!f.matches("ab"));
    }

    #[test]
    fn between_is_exclusive() {
        let f = RowFilter::between("b", "d");
        assert!(!f.matches("b"));
        assert!(f.matches("b "));
        assert!(f.matches("c"));
        assert!(!f.matches("d"));
    }

    #[test]
    fn from_until_includes_lower() {
        let f = RowFilter::from_until("b", "d");
        assert!(f.matches("b"));
        assert!(!f.matches("d"));
    }

    #[test]
    fn or_combines() {
        let f = RowFilter::Eq("x".into()).or(RowFilter::between("a", "c"));
        assert!(f.matches("x"));
        assert!(f.matches("b"));
        assert!(!f.matches("c"));

        let g = f.or(RowFilter::Eq("z".into()));
        match &g {
            RowFilter::Any(filters) => assert_eq!(filters.len(), 3),
            other => panic!("expected Any, got {other:?}"),
        }
        assert!(g.matches("z"));
    }
}
