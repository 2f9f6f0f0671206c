//! SQL text for every logical operation.
//!
//! Postgres and SQLite both accept `$N` placeholders, `ON CONFLICT ... DO
//! NOTHING` and `RETURNING`, so data statements are written once and shared.
//! Only schema teardown differs per dialect; schema creation lives in the
//! per-dialect migration directories.

macro_rules! select_elements {
    ($tail:literal) => {
        concat!(
            "SELECT e.id, e.spec_name, e.status, e.priority, b.name AS block_name,
                    e.number_of_jobs, e.retry_count, e.created_at, e.updated_at
             FROM wq_element e
             LEFT JOIN wq_block b ON b.id = e.block_id ",
            $tail
        )
    };
}

// ---------------------------------------------------------------------------
// Elements
// ---------------------------------------------------------------------------

pub(crate) const INSERT_ELEMENT: &str = "INSERT INTO wq_element
        (spec_name, status, priority, block_id, number_of_jobs, retry_count, created_at, updated_at)
     VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
     RETURNING id";

pub(crate) const ELEMENT_BY_ID: &str = select_elements!("WHERE e.id = $1");

pub(crate) const ELEMENTS_BY_SPEC: &str =
    select_elements!("WHERE e.spec_name = $1 ORDER BY e.created_at ASC, e.id ASC");

pub(crate) const ELEMENTS_BY_STATUS: &str = select_elements!(
    "WHERE e.status = $1 ORDER BY e.priority DESC, e.created_at ASC, e.id ASC"
);

pub(crate) const ACQUIRABLE_ELEMENTS: &str = select_elements!(
    "WHERE e.status = 'Available'
       AND e.priority >= $1
       AND (NOT EXISTS (SELECT 1 FROM wq_element_subs_assoc a WHERE a.element_id = e.id)
            OR EXISTS (SELECT 1 FROM wq_element_subs_assoc a
                       WHERE a.element_id = e.id AND a.subscription_id = $2))
     ORDER BY e.priority DESC, e.created_at ASC, e.id ASC
     LIMIT $3"
);

pub(crate) const STALE_ELEMENTS: &str = select_elements!(
    "WHERE e.status = $1 AND e.updated_at < $2 ORDER BY e.updated_at ASC, e.id ASC"
);

pub(crate) const SPEC_EXISTS: &str = "SELECT id FROM wq_element WHERE spec_name = $1 LIMIT 1";

pub(crate) const SWAP_STATUS: &str =
    "UPDATE wq_element SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4";

pub(crate) const RECORD_FAILURE: &str = "UPDATE wq_element
     SET status = 'Failed', retry_count = retry_count + 1, updated_at = $1
     WHERE id = $2 AND status = 'Running'";

pub(crate) const UPDATE_PRIORITY: &str =
    "UPDATE wq_element SET priority = $1, updated_at = $2 WHERE id = $3";

pub(crate) const DELETE_ELEMENT: &str = "DELETE FROM wq_element WHERE id = $1";

pub(crate) const PURGE_SETTLED_ASSOCIATIONS: &str = "DELETE FROM wq_element_subs_assoc
     WHERE element_id IN (
         SELECT id FROM wq_element
         WHERE status IN ('Done', 'Failed', 'Canceled') AND updated_at < $1)";

pub(crate) const PURGE_SETTLED_ELEMENTS: &str =
    "DELETE FROM wq_element WHERE status IN ('Done', 'Failed', 'Canceled') AND updated_at < $1";

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

pub(crate) const BLOCK_ID: &str = "SELECT id FROM wq_block WHERE name = $1";

pub(crate) const INSERT_BLOCK: &str =
    "INSERT INTO wq_block (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id";

pub(crate) const INSERT_PARENTAGE: &str = "INSERT INTO wq_block_parentage (child, parent)
     VALUES ($1, $2)
     ON CONFLICT (child, parent) DO NOTHING";

pub(crate) const PARENT_NAMES: &str = "SELECT p.name
     FROM wq_block_parentage bp
     JOIN wq_block c ON c.id = bp.child
     JOIN wq_block p ON p.id = bp.parent
     WHERE c.name = $1
     ORDER BY p.name";

pub(crate) const CHILD_NAMES: &str = "SELECT c.name
     FROM wq_block_parentage bp
     JOIN wq_block c ON c.id = bp.child
     JOIN wq_block p ON p.id = bp.parent
     WHERE p.name = $1
     ORDER BY c.name";

pub(crate) const PARENTAGE_EDGES: &str = "SELECT c.name, p.name
     FROM wq_block_parentage bp
     JOIN wq_block c ON c.id = bp.child
     JOIN wq_block p ON p.id = bp.parent
     ORDER BY c.name, p.name";

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

pub(crate) const INSERT_SUBSCRIPTION: &str = "INSERT INTO wq_subscription (name, created_at)
     VALUES ($1, $2)
     ON CONFLICT (name) DO NOTHING
     RETURNING id, name, created_at";

pub(crate) const SUBSCRIPTION_BY_NAME: &str =
    "SELECT id, name, created_at FROM wq_subscription WHERE name = $1";

pub(crate) const SUBSCRIPTION_BY_ID: &str =
    "SELECT id, name, created_at FROM wq_subscription WHERE id = $1";

// The no-op write takes the element's row lock, so a concurrent
// acquisition either sees the new association or blocks until it lands.
pub(crate) const HOLD_BINDABLE: &str = "UPDATE wq_element SET updated_at = $1
     WHERE id = $2 AND status IN ('Available', 'Negotiating')";

pub(crate) const HOLD_AVAILABLE: &str =
    "UPDATE wq_element SET updated_at = $1 WHERE id = $2 AND status = 'Available'";

pub(crate) const INSERT_ASSOCIATION: &str =
    "INSERT INTO wq_element_subs_assoc (element_id, subscription_id)
     VALUES ($1, $2)
     ON CONFLICT (element_id, subscription_id) DO NOTHING";

pub(crate) const DELETE_ASSOCIATION: &str =
    "DELETE FROM wq_element_subs_assoc WHERE element_id = $1 AND subscription_id = $2";

pub(crate) const RETAIN_ASSOCIATION: &str =
    "DELETE FROM wq_element_subs_assoc WHERE element_id = $1 AND subscription_id <> $2";

pub(crate) const DELETE_ASSOCIATIONS: &str =
    "DELETE FROM wq_element_subs_assoc WHERE element_id = $1";

pub(crate) const SUBSCRIPTIONS_FOR: &str = "SELECT s.id, s.name, s.created_at
     FROM wq_subscription s
     JOIN wq_element_subs_assoc a ON a.subscription_id = s.id
     WHERE a.element_id = $1
     ORDER BY s.name";

pub(crate) const HEALTH_CHECK: &str = "SELECT 1";

// ---------------------------------------------------------------------------
// Teardown, dependents first
// ---------------------------------------------------------------------------

pub(crate) mod postgres {
    pub(crate) const DESTROY: &[&str] = &[
        "DROP TABLE IF EXISTS wq_element_subs_assoc",
        "DROP TABLE IF EXISTS wq_block_parentage",
        "DROP TABLE IF EXISTS wq_element",
        "DROP TABLE IF EXISTS wq_subscription",
        "DROP TABLE IF EXISTS wq_block",
        // sequences outlive their tables
        "DROP SEQUENCE IF EXISTS wq_element_seq",
        "DROP SEQUENCE IF EXISTS wq_subscription_seq",
        "DROP SEQUENCE IF EXISTS wq_block_seq",
        "DROP TABLE IF EXISTS _sqlx_migrations",
    ];
}

pub(crate) mod sqlite {
    pub(crate) const DESTROY: &[&str] = &[
        "DROP TABLE IF EXISTS wq_element_subs_assoc",
        "DROP TABLE IF EXISTS wq_block_parentage",
        "DROP TABLE IF EXISTS wq_element",
        "DROP TABLE IF EXISTS wq_subscription",
        "DROP TABLE IF EXISTS wq_block",
        "DROP TABLE IF EXISTS _sqlx_migrations",
    ];
}
