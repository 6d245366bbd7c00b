use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::non_negative;

/// Value of stock on hand at a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct InventorySnapshot {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub stock_value: Decimal,
}

/// Capital employed at a given date, the denominator of ROI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct CapitalSnapshot {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub capital_value: Decimal,
}
