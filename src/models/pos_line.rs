use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{non_negative, not_blank, Area, ItemType, PaymentMethod};

/// One line item of a POS export.
///
/// `receipt_id` groups lines into receipts; `item_name` links the line to
/// the price list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct PosLine {
    pub timestamp: NaiveDateTime,
    pub item_type: ItemType,
    #[validate(custom = "not_blank")]
    pub item_name: String,
    #[validate(range(min = 1))]
    pub quantity: u32,
    #[validate(custom = "non_negative")]
    pub price_per_item: Decimal,
    #[validate(custom = "non_negative")]
    pub total_price: Decimal,
    pub payment_method: PaymentMethod,
    pub area: Area,
    #[validate(custom = "not_blank")]
    pub receipt_id: String,
}
