use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{non_negative, not_blank};

/// Menu price of an item, used to measure discounts on POS lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PriceListItem {
    #[validate(custom = "not_blank")]
    pub item_name: String,
    #[validate(custom = "non_negative")]
    pub theoretical_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReorderLevel {
    #[validate(custom = "not_blank")]
    pub item_name: String,
    pub reorder_level: u32,
}
