//! # Validation
//!
//! Boundary checks and clamps applied before business logic runs. Numeric
//! ranges are clamped into meaning wherever possible; only inputs with no
//! sensible interpretation become errors.

use crate::error::{CoreError, CoreResult};
use crate::money::BPS_SCALE;
use crate::types::{PaymentMethod, Settlement};

/// Clamps a basis-point percentage to the 0–100% range.
#[inline]
pub fn clamp_percent_bps(bps: u32) -> u32 {
    bps.min(BPS_SCALE as u32)
}

/// Checks a settlement against the amount due.
///
/// Cash settlements must tender at least the amount due, and a recorded
/// change figure must match `tendered − amount`.
pub fn validate_settlement(settlement: &Settlement, due_cents: i64) -> CoreResult<()> {
    if settlement.amount_cents < due_cents {
        return Err(CoreError::InsufficientSettlement {
            tendered: settlement.amount_cents,
            due: due_cents,
        });
    }
    if settlement.method == PaymentMethod::Cash {
        let tendered = settlement.tendered_cents.unwrap_or(settlement.amount_cents);
        if tendered < settlement.amount_cents {
            return Err(CoreError::InsufficientSettlement { tendered, due: settlement.amount_cents });
        }
        if let Some(change) = settlement.change_cents {
            if change != tendered - settlement.amount_cents {
                return Err(CoreError::Validation(crate::error::ValidationError::InvalidFormat {
                    field: "change_cents".into(),
                    reason: format!("expected {}, got {change}", tendered - settlement.amount_cents),
                }));
            }
        }
    }
    Ok(())
}
