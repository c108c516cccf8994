//! Parent-pointer forests.
//!
//! Text format: the node count `n`, then `n` pairs `index parent`, all
//! whitespace-separated. A node whose parent is itself is a root. Tokens after
//! the last pair are ignored.

use crate::error::ForestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forest {
    parents: Vec<usize>,
}

impl Forest {
    pub fn parse(text: &str) -> Result<Self, ForestError> {
        let mut tokens = text.split_whitespace().enumerate();
        let (position, first) = tokens.next().ok_or(ForestError::Empty)?;
        let count = usize::try_from(integer(position, first)?).map_err(|_| {
            ForestError::BadInteger {
                position,
                token: first.to_string(),
            }
        })?;

        // The header is untrusted: only size the table once the pairs exist.
        let mut values = tokens.map(|(position, token)| integer(position, token));
        let mut pairs = Vec::new();
        while pairs.len() < count {
            let (Some(index), Some(parent)) = (values.next(), values.next()) else {
                return Err(ForestError::MissingPair {
                    expected: count,
                    found: pairs.len(),
                });
            };
            pairs.push((in_range(index?, count)?, in_range(parent?, count)?));
        }

        let mut parents: Vec<Option<usize>> = vec![None; count];
        for (index, parent) in pairs {
            if parents[index].replace(parent).is_some() {
                return Err(ForestError::Duplicate { index });
            }
        }

        // n distinct in-range indices cover every slot.
        Self::from_parents(parents.into_iter().flatten().collect())
    }

    /// Build from a parent table, rejecting out-of-range parents and cycles.
    pub fn from_parents(parents: Vec<usize>) -> Result<Self, ForestError> {
        let count = parents.len();
        if let Some(&bad) = parents.iter().find(|&&p| p >= count) {
            return Err(ForestError::OutOfRange {
                index: i64::try_from(bad).unwrap_or(i64::MAX),
                count,
            });
        }
        for start in 0..count {
            let mut node = start;
            let mut steps = 0;
            while parents[node] != node {
                node = parents[node];
                steps += 1;
                if steps > count {
                    return Err(ForestError::Cycle { node: start });
                }
            }
        }
        Ok(Self { parents })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Parent of `node` (itself for a root).
    #[must_use]
    pub fn parent(&self, node: usize) -> usize {
        self.parents[node]
    }

    #[must_use]
    pub fn is_root(&self, node: usize) -> bool {
        self.parents[node] == node
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&node| self.is_root(node))
    }

    /// Number of direct children of each node. Roots are not their own child.
    #[must_use]
    pub fn child_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.len()];
        for (node, &parent) in self.parents.iter().enumerate() {
            if parent != node {
                counts[parent] += 1;
            }
        }
        counts
    }
}

fn integer(position: usize, token: &str) -> Result<i64, ForestError> {
    token.parse().map_err(|_| ForestError::BadInteger {
        position,
        token: token.to_string(),
    })
}

fn in_range(value: i64, count: usize) -> Result<usize, ForestError> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v < count)
        .ok_or(ForestError::OutOfRange {
            index: value,
            count,
        })
}
