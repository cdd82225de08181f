//! Startup integrity check over persisted compartment rows.

use thiserror::Error;
use tracing::instrument;

use asrs_warehouse::{IntegrityPolicy, StateCorruption, classify_row};

use crate::store::{StoreError, WarehouseStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub scanned: usize,
    /// Rows rewritten to `Empty` under `IntegrityPolicy::Repair`.
    pub repaired: Vec<StateCorruption>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("{} corrupt compartment row(s): {}", .0.len(), describe(.0))]
    Rejected(Vec<StateCorruption>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn describe(corruptions: &[StateCorruption]) -> String {
    corruptions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Classify every compartment row and apply `policy` to the corrupt ones.
///
/// Under `Reject` nothing is written and every offending row is reported.
#[instrument(skip(store), err)]
pub async fn check_integrity<S>(
    store: &S,
    policy: IntegrityPolicy,
) -> Result<IntegrityReport, IntegrityError>
where
    S: WarehouseStore + ?Sized,
{
    let rows = store.compartment_rows().await?;
    let corrupt: Vec<StateCorruption> = rows
        .iter()
        .filter_map(|row| classify_row(row.id, &row.status, row.item_id).err())
        .collect();

    if corrupt.is_empty() {
        tracing::info!(scanned = rows.len(), "compartment rows consistent");
        return Ok(IntegrityReport {
            scanned: rows.len(),
            repaired: Vec::new(),
        });
    }

    match policy {
        IntegrityPolicy::Reject => {
            tracing::error!(corrupt = corrupt.len(), "corrupt compartment rows; refusing to start");
            Err(IntegrityError::Rejected(corrupt))
        }
        IntegrityPolicy::Repair => {
            for corruption in &corrupt {
                store.reset_compartment(corruption.compartment_id).await?;
                tracing::warn!(
                    compartment_id = %corruption.compartment_id,
                    problem = %corruption.kind,
                    "repaired corrupt compartment row to Empty"
                );
            }
            Ok(IntegrityReport {
                scanned: rows.len(),
                repaired: corrupt,
            })
        }
    }
}
