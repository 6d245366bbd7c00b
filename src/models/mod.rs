//! Flat record types produced by ingestion and consumed by KPI aggregation.
//!
//! Every record is a plain set of scalar fields. Field-level constraints
//! (non-negative amounts, required identifiers, minimum quantities) are
//! expressed with `validator` so callers can check a record right after it
//! has been parsed.

pub mod cost;
pub mod invoice;
pub mod pos_line;
pub mod price_list;
pub mod snapshot;

pub use cost::{FixedCost, LaborCost};
pub use invoice::{PurchaseInvoice, SalesInvoice};
pub use pos_line::PosLine;
pub use price_list::{PriceListItem, ReorderLevel};
pub use snapshot::{CapitalSnapshot, InventorySnapshot};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;
use validator::ValidationError;

/// Business area a sale or cost is attributed to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
pub enum Area {
    Restaurant,
    Bar,
    Events,
    Catering,
    Other,
}

/// Product category of a POS line or purchase.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ItemType {
    Food,
    Bev,
    Other,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PaymentMethod {
    Card,
    Cash,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CostType {
    Rent,
    Leasing,
    Utilities,
    Other,
}

/// Rejects negative decimal amounts.
pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must be greater than or equal to 0".into());
        return Err(err);
    }
    Ok(())
}

/// Rejects identifiers that are empty or only whitespace.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}
