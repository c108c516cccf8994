//! Where leaf values come from.

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, BufReader, Stdin};

use crate::error::ForestError;

/// Supplies one integer per leaf. Called with the forest mutex held, so
/// implementations see requests one at a time.
pub trait LeafSource: Send {
    fn read_leaf(&mut self, node: usize) -> Result<i64, ForestError>;
}

/// Reads whitespace-separated integers from a stream, one per request.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    pending: VecDeque<String>,
}

impl ReaderSource<BufReader<Stdin>> {
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
        }
    }

    fn next_token(&mut self) -> io::Result<Option<String>> {
        while self.pending.is_empty() {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
        Ok(self.pending.pop_front())
    }
}

impl<R: BufRead + Send> LeafSource for ReaderSource<R> {
    fn read_leaf(&mut self, node: usize) -> Result<i64, ForestError> {
        let token = self
            .next_token()?
            .ok_or(ForestError::MissingLeaf { node })?;
        token
            .parse()
            .map_err(|_| ForestError::BadLeaf { node, token })
    }
}

/// Fixed values per node.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<usize, i64>,
}

impl MapSource {
    pub fn new(values: impl IntoIterator<Item = (usize, i64)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

impl LeafSource for MapSource {
    fn read_leaf(&mut self, node: usize) -> Result<i64, ForestError> {
        self.values
            .get(&node)
            .copied()
            .ok_or(ForestError::MissingLeaf { node })
    }
}
