use std::io;

use foothread_core::{SyncError, ThreadError};
use thiserror::Error;

/// Everything that can go wrong reading a forest or summing it.
#[derive(Debug, Error)]
pub enum ForestError {
    #[error("tree description is empty")]
    Empty,
    #[error("token {position}: expected an integer, found {token:?}")]
    BadInteger { position: usize, token: String },
    #[error("node {index} is out of range for {count} nodes")]
    OutOfRange { index: i64, count: usize },
    #[error("node {index} is listed twice")]
    Duplicate { index: usize },
    #[error("expected {expected} (index, parent) pairs, found {found}")]
    MissingPair { expected: usize, found: usize },
    #[error("parent chain from node {node} never reaches a root")]
    Cycle { node: usize },
    #[error("no value available for leaf node {node}")]
    MissingLeaf { node: usize },
    #[error("leaf node {node}: {token:?} is not an integer")]
    BadLeaf { node: usize, token: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Thread(#[from] ThreadError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}
