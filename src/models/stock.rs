use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Identifies one stock position: a product in a warehouse, optionally at a location.
///
/// A `None` location is the warehouse-level position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Triple {
    pub product_id: i32,
    pub warehouse_id: i32,
    pub location_id: Option<i32>,
}

impl Triple {
    pub fn new(product_id: i32, warehouse_id: i32, location_id: Option<i32>) -> Self {
        Self {
            product_id,
            warehouse_id,
            location_id,
        }
    }

    /// Canonical text key backing the unique index on `stock_balances.triple_key`.
    pub fn key(&self) -> String {
        match self.location_id {
            Some(location_id) => format!("{}:{}:{}", self.product_id, self.warehouse_id, location_id),
            None => format!("{}:{}:-", self.product_id, self.warehouse_id),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Optional external document a movement points at (purchase order, sales order...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Reference {
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

impl Reference {
    pub const MAX_TYPE_LEN: usize = 50;
    pub const MAX_ID_LEN: usize = 100;

    pub fn new(reference_type: Option<String>, reference_id: Option<String>) -> Self {
        Self {
            reference_type: normalize(reference_type),
            reference_id: normalize(reference_id),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let Some(ref_type) = &self.reference_type {
            if ref_type.chars().count() > Self::MAX_TYPE_LEN {
                return Err(ServiceError::ValidationError(format!(
                    "Reference type must be at most {} characters.",
                    Self::MAX_TYPE_LEN
                )));
            }
        }
        if let Some(ref_id) = &self.reference_id {
            if ref_id.chars().count() > Self::MAX_ID_LEN {
                return Err(ServiceError::ValidationError(format!(
                    "Reference id must be at most {} characters.",
                    Self::MAX_ID_LEN
                )));
            }
        }
        Ok(())
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Who performed a movement. Recorded on the ledger row and the balance audit columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<i32>,
    pub name: Option<String>,
}

impl Actor {
    pub fn new(user_id: Option<i32>, name: Option<String>) -> Self {
        Self {
            user_id,
            name: normalize(name),
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            name: Some("system".to_string()),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running movement.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), ServiceError> {
        if self.is_cancelled() {
            return Err(ServiceError::Cancelled(
                "Stock movement was cancelled before commit.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call context every movement operation receives.
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub actor: Actor,
    pub cancel: CancelSignal,
}

impl MovementContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error("balance would become negative")]
    Negative,
    #[error("balance would overflow")]
    Overflow,
}

/// Applies a signed delta to an on-hand quantity.
///
/// Every balance mutation goes through here; a result below zero or outside the
/// integer range is rejected and the current value is left untouched.
pub fn apply_delta(current: i32, delta: i32) -> Result<i32, DeltaError> {
    let next = current.checked_add(delta).ok_or(DeltaError::Overflow)?;
    if next < 0 {
        return Err(DeltaError::Negative);
    }
    Ok(next)
}
