//! Financial KPI arithmetic over parsed records.
//!
//! All functions are pure and work on `rust_decimal::Decimal` so sums of
//! money never pick up binary floating point error. Rounding is half-up
//! (midpoint away from zero) and pads to a fixed scale: money to 2 places,
//! ratios to 4, day counts to 1.

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::models::{Area, PaymentMethod, PosLine, PriceListItem, PurchaseInvoice, SalesInvoice};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KpiError {
    #[error("allocation basis must contain at least one positive weight")]
    NoPositiveWeight,

    #[error("amounts too large to total")]
    Overflow,
}

fn accumulate(acc: &mut Decimal, value: Decimal) -> Result<(), KpiError> {
    *acc = acc.checked_add(value).ok_or(KpiError::Overflow)?;
    Ok(())
}

/// Sums `values`, failing instead of wrapping past the decimal range.
pub fn checked_total(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, KpiError> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value).ok_or(KpiError::Overflow)
    })
}

fn checked_ratio(numerator: Decimal, denominator: Decimal) -> Result<Decimal, KpiError> {
    numerator
        .checked_div(denominator)
        .ok_or(KpiError::Overflow)
}

fn quantize(value: Decimal, places: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(places);
    rounded
}

/// Rounds to 2 decimal places, half-up.
pub fn q2(value: Decimal) -> Decimal {
    quantize(value, 2)
}

/// Rounds to 4 decimal places, half-up.
pub fn q4(value: Decimal) -> Decimal {
    quantize(value, 4)
}

/// Rounds to 1 decimal place, half-up.
pub fn q1(value: Decimal) -> Decimal {
    quantize(value, 1)
}

/// KPIs that can be derived from POS lines alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PosKpis {
    pub revenue_total: Decimal,
    pub revenue_by_area: BTreeMap<Area, Decimal>,
    pub revenue_by_payment: BTreeMap<PaymentMethod, Decimal>,
    pub receipt_count: usize,
    pub average_receipt: Decimal,
    /// Share of list value given away; absent without a usable price list.
    pub discount_rate: Option<Decimal>,
}

/// Builds the `item_name -> theoretical_price` lookup. Later entries win.
pub fn price_index(items: &[PriceListItem]) -> HashMap<String, Decimal> {
    items
        .iter()
        .map(|item| (item.item_name.clone(), item.theoretical_price))
        .collect()
}

/// Unrounded POS revenue per area.
pub fn pos_revenue_by_area(pos: &[PosLine]) -> Result<BTreeMap<Area, Decimal>, KpiError> {
    let mut by_area = BTreeMap::new();
    for line in pos {
        accumulate(by_area.entry(line.area).or_insert(Decimal::ZERO), line.total_price)?;
    }
    Ok(by_area)
}

pub fn kpi_pos_only(
    pos: &[PosLine],
    price_list: Option<&HashMap<String, Decimal>>,
) -> Result<PosKpis, KpiError> {
    let mut revenue_total = Decimal::ZERO;
    let mut by_area: BTreeMap<Area, Decimal> = BTreeMap::new();
    let mut by_payment: BTreeMap<PaymentMethod, Decimal> = BTreeMap::new();
    let mut receipts: HashSet<&str> = HashSet::new();
    let mut discount_numer = Decimal::ZERO;
    let mut discount_denom = Decimal::ZERO;

    let prices = price_list.filter(|p| !p.is_empty());

    for line in pos {
        let total = line.total_price;
        accumulate(&mut revenue_total, total)?;
        accumulate(by_area.entry(line.area).or_insert(Decimal::ZERO), total)?;
        accumulate(by_payment.entry(line.payment_method).or_insert(Decimal::ZERO), total)?;
        receipts.insert(line.receipt_id.as_str());

        // A zero quantity adds nothing to either side of the discount rate.
        if line.quantity == 0 {
            continue;
        }
        if let Some(theo) = prices.and_then(|p| p.get(&line.item_name)) {
            let quantity = Decimal::from(line.quantity);
            let actual = checked_ratio(total, quantity)?;
            let list_value = theo.checked_mul(quantity).ok_or(KpiError::Overflow)?;
            if *theo > actual {
                let given_away = theo
                    .checked_sub(actual)
                    .and_then(|per_unit| per_unit.checked_mul(quantity))
                    .ok_or(KpiError::Overflow)?;
                accumulate(&mut discount_numer, given_away)?;
            }
            accumulate(&mut discount_denom, list_value)?;
        }
    }

    let receipt_count = receipts.len();
    let average_receipt = checked_ratio(revenue_total, Decimal::from(receipt_count.max(1)))?;
    let discount_rate = if discount_denom > Decimal::ZERO {
        Some(q4(checked_ratio(discount_numer, discount_denom)?))
    } else {
        None
    };

    debug!(
        lines = pos.len(),
        receipts = receipt_count,
        "computed POS KPIs"
    );

    Ok(PosKpis {
        revenue_total: q2(revenue_total),
        revenue_by_area: by_area.into_iter().map(|(k, v)| (k, q2(v))).collect(),
        revenue_by_payment: by_payment.into_iter().map(|(k, v)| (k, q2(v))).collect(),
        receipt_count,
        average_receipt: q2(average_receipt),
        discount_rate,
    })
}

/// Adds invoiced revenue to per-area revenue. The input map is left untouched.
pub fn add_sales_invoices(
    revenue_by_area: &BTreeMap<Area, Decimal>,
    sales_invoices: &[SalesInvoice],
) -> Result<BTreeMap<Area, Decimal>, KpiError> {
    let mut out = revenue_by_area.clone();
    for invoice in sales_invoices {
        accumulate(out.entry(invoice.area).or_insert(Decimal::ZERO), invoice.amount)?;
    }
    Ok(out)
}

/// Scales the positive weights of `alloc_basis` so they sum to one.
/// Non-positive weights are dropped.
pub fn normalized_weights(
    alloc_basis: &BTreeMap<Area, Decimal>,
) -> Result<BTreeMap<Area, Decimal>, KpiError> {
    let clean: BTreeMap<Area, Decimal> = alloc_basis
        .iter()
        .filter(|(_, w)| **w > Decimal::ZERO)
        .map(|(k, w)| (*k, *w))
        .collect();
    let total = checked_total(clean.values().copied())?;
    if total <= Decimal::ZERO {
        return Err(KpiError::NoPositiveWeight);
    }
    clean
        .into_iter()
        .map(|(k, w)| checked_ratio(w, total).map(|weight| (k, weight)))
        .collect()
}

/// Cost of goods sold per area. Purchases without an area are spread over
/// `alloc_basis` when one is given; otherwise they stay unattributed.
pub fn compute_cogs(
    purchases: &[PurchaseInvoice],
    alloc_basis: Option<&BTreeMap<Area, Decimal>>,
) -> Result<BTreeMap<Area, Decimal>, KpiError> {
    let mut cogs_area: BTreeMap<Area, Decimal> = BTreeMap::new();
    let mut undirected = Decimal::ZERO;

    for purchase in purchases {
        match purchase.area {
            Some(area) => {
                accumulate(cogs_area.entry(area).or_insert(Decimal::ZERO), purchase.amount)?
            }
            None => accumulate(&mut undirected, purchase.amount)?,
        }
    }

    if undirected > Decimal::ZERO {
        match alloc_basis.filter(|basis| !basis.is_empty()) {
            Some(basis) => {
                for (area, weight) in normalized_weights(basis)? {
                    let share = undirected.checked_mul(weight).ok_or(KpiError::Overflow)?;
                    accumulate(cogs_area.entry(area).or_insert(Decimal::ZERO), share)?;
                }
            }
            None => warn!(
                %undirected,
                "undirected purchases left unallocated: no allocation basis"
            ),
        }
    }

    Ok(cogs_area)
}

/// Revenue minus COGS for every area present on either side.
pub fn gross_margin_by_area(
    revenue_by_area: &BTreeMap<Area, Decimal>,
    cogs_by_area: &BTreeMap<Area, Decimal>,
) -> Result<BTreeMap<Area, Decimal>, KpiError> {
    revenue_by_area
        .keys()
        .chain(cogs_by_area.keys())
        .map(|area| {
            let revenue = revenue_by_area.get(area).copied().unwrap_or_default();
            let cogs = cogs_by_area.get(area).copied().unwrap_or_default();
            revenue
                .checked_sub(cogs)
                .map(|margin| (*area, q2(margin)))
                .ok_or(KpiError::Overflow)
        })
        .collect()
}

pub fn operating_margin_total(
    gross_total: Decimal,
    labor: Decimal,
    fixed: Decimal,
    other: Decimal,
) -> Result<Decimal, KpiError> {
    [labor, fixed, other]
        .into_iter()
        .try_fold(gross_total, |acc, cost| acc.checked_sub(cost))
        .map(q2)
        .ok_or(KpiError::Overflow)
}

/// `None` when there is no positive capital to measure against.
pub fn roi_monthly(
    operating_profit: Decimal,
    capital_value: Decimal,
) -> Result<Option<Decimal>, KpiError> {
    guarded_ratio(operating_profit, capital_value, q4)
}

pub fn inventory_turnover(
    cogs_total: Decimal,
    avg_stock: Decimal,
) -> Result<Option<Decimal>, KpiError> {
    guarded_ratio(cogs_total, avg_stock, q4)
}

/// Days the current stock lasts at the average daily consumption.
pub fn inventory_coverage_days(
    stock_value: Decimal,
    avg_daily_consumption: Decimal,
) -> Result<Option<Decimal>, KpiError> {
    guarded_ratio(stock_value, avg_daily_consumption, q1)
}

fn guarded_ratio(
    numerator: Decimal,
    denominator: Decimal,
    round: fn(Decimal) -> Decimal,
) -> Result<Option<Decimal>, KpiError> {
    if denominator <= Decimal::ZERO {
        return Ok(None);
    }
    checked_ratio(numerator, denominator).map(|ratio| Some(round(ratio)))
}
