//! Gap-tolerant, race-free document numbers.
//!
//! One sequence row exists per (tenant, document type). Allocation reads the
//! row and advances it with a version compare-and-swap inside the caller's
//! transaction, so a rolled-back document never consumes a number and two
//! concurrent creators can never observe the same value.

use chrono::Utc;
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

use crate::entities::document_sequence;
use crate::entities::enums::DocumentType;
use crate::errors::ServiceError;
use crate::tenancy::TenantGateway;

/// `PREFIX-000042` with the numeric part zero-padded to `width`.
pub fn format_number(prefix: &str, value: i64, width: usize) -> String {
    format!("{}-{:0width$}", prefix, value, width = width)
}

/// Hands out the next number for `document_type` in the gateway's tenant.
pub async fn allocate<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    document_type: DocumentType,
    width: usize,
) -> Result<String, ServiceError> {
    let existing = gw
        .one(
            document_sequence::Entity::find()
                .filter(document_sequence::Column::DocumentType.eq(document_type)),
        )
        .await?;

    let (prefix, value) = match existing {
        Some(sequence) => {
            let value = sequence.next_value;
            let update = document_sequence::ActiveModel {
                next_value: Set(value + 1),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            gw.update::<document_sequence::Entity, _>(sequence.id, update, Some(sequence.version))
                .await?;
            (sequence.prefix, value)
        }
        None => {
            let prefix = document_type.number_prefix().to_string();
            let first = document_sequence::ActiveModel {
                id: Set(Uuid::new_v4()),
                document_type: Set(document_type),
                prefix: Set(prefix.clone()),
                next_value: Set(2),
                version: Set(1),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            // Two first allocations race on the unique (tenant, type) index.
            gw.insert(first).await.map_err(|err| match err {
                ServiceError::Conflict(detail) => ServiceError::ConcurrentModification(detail),
                other => other,
            })?;
            (prefix, 1)
        }
    };

    let number = format_number(&prefix, value, width);
    debug!(
        tenant_id = %gw.context().tenant_id(),
        %document_type,
        %number,
        "allocated document number"
    );
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_width() {
        assert_eq!(format_number("SO", 42, 6), "SO-000042");
        assert_eq!(format_number("GRN", 7, 3), "GRN-007");
    }

    #[test]
    fn wider_values_are_not_truncated() {
        assert_eq!(format_number("PI", 1_234_567, 4), "PI-1234567");
    }
}
