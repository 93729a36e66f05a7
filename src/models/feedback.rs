use std::collections::HashSet;

/// Resolved feedback: the catalog indices of items a caller interacted with.
///
/// Indices are kept sorted and de-duplicated so membership checks during
/// ranking are a binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackSet {
    indices: Vec<usize>,
}

impl FeedbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Largest index in the set, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }
}

impl FromIterator<usize> for FeedbackSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut indices: Vec<usize> = iter.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }
}

/// Outcome of mapping caller-supplied identifiers onto catalog indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub feedback: FeedbackSet,
    /// Identifiers the catalog does not know, in the order they were given.
    /// Repeats are reported once.
    pub unresolved: Vec<String>,
}

impl Resolution {
    pub(crate) fn from_lookups<'a, I>(lookups: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<usize>)>,
    {
        let mut indices = Vec::new();
        let mut unresolved = Vec::new();
        let mut seen_unresolved = HashSet::new();

        for (identifier, index) in lookups {
            match index {
                Some(index) => indices.push(index),
                None => {
                    if seen_unresolved.insert(identifier) {
                        unresolved.push(identifier.to_string());
                    }
                }
            }
        }

        Self {
            feedback: indices.into_iter().collect(),
            unresolved,
        }
    }
}
