//! Turning a split job specification into queue elements.

use tracing::info;

use crate::db::{Db, Transaction};
use crate::error::{Error, Result};
use crate::lineage::{ensure_block_on, record_parentage_on};
use crate::model::{ElementId, ElementRequest, NewElement};
use crate::store::insert_on;
use crate::validate;

/// Insert one element per request for `spec_name`, creating referenced
/// blocks and recording each request's parentage. All or nothing.
pub async fn ingest(db: &Db, spec_name: &str, requests: &[ElementRequest]) -> Result<Vec<ElementId>> {
    validate::identifier(spec_name)?;
    for request in requests {
        check_request(request)?;
    }

    let mut tx = db.begin().await?;
    let result = ingest_on(&mut *tx, spec_name, requests).await;
    let ids = tx.finish(result).await?;
    info!(spec = spec_name, elements = ids.len(), "spec ingested");
    Ok(ids)
}

fn check_request(request: &ElementRequest) -> Result<()> {
    validate::priority(request.priority)?;
    if request.number_of_jobs < 1 {
        return Err(Error::InvalidInput(format!(
            "number_of_jobs must be at least 1, got {}",
            request.number_of_jobs
        )));
    }
    match (&request.block_name, &request.parent_block_name) {
        (Some(block), parent) => {
            validate::block_name(block)?;
            if let Some(parent) = parent {
                validate::block_name(parent)?;
            }
            Ok(())
        }
        (None, Some(parent)) => Err(Error::InvalidInput(format!(
            "parent block {parent} given without a block"
        ))),
        (None, None) => Ok(()),
    }
}

async fn ingest_on(
    tx: &mut dyn Transaction,
    spec_name: &str,
    requests: &[ElementRequest],
) -> Result<Vec<ElementId>> {
    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        let mut new = NewElement::new(spec_name)
            .priority(request.priority)
            .number_of_jobs(request.number_of_jobs);
        if let Some(block) = &request.block_name {
            ensure_block_on(tx, block).await?;
            if let Some(parent) = &request.parent_block_name {
                ensure_block_on(tx, parent).await?;
                record_parentage_on(tx, block, parent).await?;
            }
            new = new.block(block.as_str());
        }
        ids.push(insert_on(tx, &new).await?);
    }
    Ok(ids)
}
