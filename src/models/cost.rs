use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{non_negative, Area, CostType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct LaborCost {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    #[serde(default)]
    pub area: Option<Area>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct FixedCost {
    pub date: NaiveDate,
    #[validate(custom = "non_negative")]
    pub amount: Decimal,
    pub cost_type: CostType,
}
