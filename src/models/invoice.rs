use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{non_negative, Area, ItemType};

/// Revenue booked outside the POS (events, catering contracts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct SalesInvoice {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    pub area: Area,
}

/// Supplier invoice. Without an `area` the amount is undirected and only
/// reaches an area through an allocation basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PurchaseInvoice {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    pub category: ItemType,
    #[serde(default)]
    pub area: Option<Area>,
}
