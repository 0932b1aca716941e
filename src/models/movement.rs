use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::{NotSet, Set};

use crate::{
    entities::stock_transaction::{self, TransactionType},
    errors::ServiceError,
    models::stock::{Actor, Reference, Triple},
};

/// A ledger row that has passed its kind-specific checks but is not yet persisted.
///
/// Fields are private: the only way to build one is through [`inbound`](Self::inbound),
/// [`outbound`](Self::outbound) or [`adjustment`](Self::adjustment), so the sign of
/// `quantity_delta` always agrees with the kind and cost only ever rides on `IN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockTransaction {
    triple: Triple,
    kind: TransactionType,
    quantity_delta: i32,
    unit_cost: Option<Decimal>,
    reference: Reference,
}

impl NewStockTransaction {
    pub fn inbound(
        triple: Triple,
        quantity: i32,
        unit_cost: Option<Decimal>,
        reference: Reference,
    ) -> Result<Self, ServiceError> {
        ensure_positive(quantity)?;
        if matches!(unit_cost, Some(cost) if cost < Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "Unit cost cannot be negative.".to_string(),
            ));
        }
        reference.validate()?;
        Ok(Self {
            triple,
            kind: TransactionType::In,
            quantity_delta: quantity,
            unit_cost,
            reference,
        })
    }

    pub fn outbound(
        triple: Triple,
        quantity: i32,
        reference: Reference,
    ) -> Result<Self, ServiceError> {
        ensure_positive(quantity)?;
        reference.validate()?;
        Ok(Self {
            triple,
            kind: TransactionType::Out,
            quantity_delta: -quantity,
            unit_cost: None,
            reference,
        })
    }

    pub fn adjustment(
        triple: Triple,
        delta: i32,
        reference: Reference,
    ) -> Result<Self, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "Adjustment quantity cannot be zero.".to_string(),
            ));
        }
        reference.validate()?;
        Ok(Self {
            triple,
            kind: TransactionType::Adjust,
            quantity_delta: delta,
            unit_cost: None,
            reference,
        })
    }

    pub fn triple(&self) -> Triple {
        self.triple
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn quantity_delta(&self) -> i32 {
        self.quantity_delta
    }

    pub fn unit_cost(&self) -> Option<Decimal> {
        self.unit_cost
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn into_active_model(
        self,
        created_at: DateTime<Utc>,
        actor: &Actor,
    ) -> stock_transaction::ActiveModel {
        stock_transaction::ActiveModel {
            id: NotSet,
            product_id: Set(self.triple.product_id),
            warehouse_id: Set(self.triple.warehouse_id),
            location_id: Set(self.triple.location_id),
            transaction_type: Set(self.kind),
            quantity_delta: Set(self.quantity_delta),
            unit_cost: Set(self.unit_cost),
            reference_type: Set(self.reference.reference_type),
            reference_id: Set(self.reference.reference_id),
            created_at: Set(created_at),
            created_by_user_id: Set(actor.user_id),
            created_by_name: Set(actor.name.clone()),
        }
    }
}

fn ensure_positive(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Quantity must be greater than zero.".to_string(),
        ));
    }
    Ok(())
}
