//! Block lineage: named data blocks and the acyclic parentage graph
//! between them.
//!
//! Edges are append-only. A new edge `child -> parent` is refused when
//! `child` is already reachable upward from `parent`, which keeps the graph
//! a DAG as long as edges are added one transaction at a time. Two
//! transactions adding opposite edges concurrently can both pass the check.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::db::{Db, Transaction, Tx};
use crate::error::{Error, Result};
use crate::model::{Block, BlockId};
use crate::telemetry::metrics;
use crate::validate;

/// Which way to walk the parentage graph.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Records blocks and parentage edges and answers reachability queries.
#[derive(Clone)]
pub struct LineageTracker {
    db: Db,
}

impl LineageTracker {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Id of block `name`, creating the block if it does not exist.
    pub async fn ensure_block(&self, name: &str, within: Option<&mut Tx>) -> Result<BlockId> {
        validate::block_name(name)?;
        let mut scope = self.db.scope(within).await?;
        let result = ensure_block_on(scope.tx(), name).await;
        scope.finish(result).await
    }

    /// Append the edge `child -> parent`. Both blocks must exist.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown block, `Cycle` when the edge would close a
    /// loop (including `child == parent`).
    pub async fn record_parentage(
        &self,
        child: &str,
        parent: &str,
        within: Option<&mut Tx>,
    ) -> Result<()> {
        validate::block_name(child)?;
        validate::block_name(parent)?;
        let mut scope = self.db.scope(within).await?;
        let result = record_parentage_on(scope.tx(), child, parent).await;
        scope.finish(result).await
    }

    /// Every block reachable by following parent edges from `name`.
    pub async fn ancestors_of(&self, name: &str) -> Result<BTreeSet<String>> {
        self.walk(name, Direction::Up).await
    }

    /// Every block reachable by following child edges from `name`.
    pub async fn descendants_of(&self, name: &str) -> Result<BTreeSet<String>> {
        self.walk(name, Direction::Down).await
    }

    pub async fn block(&self, name: &str) -> Result<Option<Block>> {
        validate::block_name(name)?;
        let mut tx = self.db.begin().await?;
        let result = tx.block_id(name).await.map(|id| {
            id.map(|id| Block {
                id,
                name: name.to_string(),
            })
        });
        tx.finish(result).await
    }

    /// All edges as `(child, parent)` names, sorted.
    pub async fn edges(&self) -> Result<Vec<(String, String)>> {
        let mut tx = self.db.begin().await?;
        let result = tx.parentage_edges().await;
        tx.finish(result).await
    }

    async fn walk(&self, name: &str, direction: Direction) -> Result<BTreeSet<String>> {
        validate::block_name(name)?;
        let mut tx = self.db.begin().await?;
        let result = async {
            require_block(&mut *tx, name).await?;
            reachable(&mut *tx, name, direction).await
        }
        .await;
        tx.finish(result).await
    }
}

pub(crate) async fn ensure_block_on(tx: &mut dyn Transaction, name: &str) -> Result<BlockId> {
    if let Some(id) = tx.block_id(name).await? {
        return Ok(id);
    }
    if let Some(id) = tx.insert_block(name).await? {
        debug!(block = name, id = %id, "block created");
        return Ok(id);
    }
    // Another writer inserted the name between lookup and insert.
    tx.block_id(name)
        .await?
        .ok_or_else(|| Error::Integrity(format!("block {name} vanished during insert")))
}

pub(crate) async fn record_parentage_on(
    tx: &mut dyn Transaction,
    child: &str,
    parent: &str,
) -> Result<()> {
    let child_id = require_block(tx, child).await?;
    let parent_id = require_block(tx, parent).await?;

    let cycle = || Error::Cycle {
        child: child.to_string(),
        parent: parent.to_string(),
    };
    if child_id == parent_id {
        return Err(cycle());
    }
    if reachable(tx, parent, Direction::Up).await?.contains(child) {
        return Err(cycle());
    }

    tx.insert_parentage(child_id, parent_id).await?;
    metrics::parentage_edges().add(1, &[]);
    debug!(child, parent, "parentage recorded");
    Ok(())
}

async fn require_block(tx: &mut dyn Transaction, name: &str) -> Result<BlockId> {
    tx.block_id(name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("block {name}")))
}

/// Breadth-first closure from `start`, excluding `start` itself unless a
/// path leads back to it.
async fn reachable(
    tx: &mut dyn Transaction,
    start: &str,
    direction: Direction,
) -> Result<BTreeSet<String>> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(name) = queue.pop_front() {
        let next = match direction {
            Direction::Up => tx.parent_names(&name).await?,
            Direction::Down => tx.child_names(&name).await?,
        };
        for neighbour in next {
            if seen.insert(neighbour.clone()) {
                queue.push_back(neighbour);
            }
        }
    }
    Ok(seen)
}
