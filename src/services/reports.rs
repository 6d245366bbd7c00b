//! Full financial report over a dataset of parsed records.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use super::kpi::{
    add_sales_invoices, checked_total, compute_cogs, gross_margin_by_area,
    inventory_coverage_days, inventory_turnover, kpi_pos_only, operating_margin_total,
    pos_revenue_by_area, price_index, q2, roi_monthly, KpiError, PosKpis,
};
use crate::errors::ServiceError;
use crate::models::{
    Area, CapitalSnapshot, FixedCost, InventorySnapshot, LaborCost, PosLine, PriceListItem,
    PurchaseInvoice, SalesInvoice,
};

/// Everything a report is computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct KpiInputs {
    pub pos_lines: Vec<PosLine>,
    pub sales_invoices: Vec<SalesInvoice>,
    pub purchase_invoices: Vec<PurchaseInvoice>,
    pub labor_costs: Vec<LaborCost>,
    pub fixed_costs: Vec<FixedCost>,
    pub inventory_snapshots: Vec<InventorySnapshot>,
    pub capital_snapshots: Vec<CapitalSnapshot>,
    pub price_list: Vec<PriceListItem>,
    /// Weights used to spread purchases that carry no area
    pub alloc_basis: Option<BTreeMap<Area, Decimal>>,
    pub other_costs: Decimal,
    /// Days covered by the dataset; derived from record dates when absent
    pub period_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FinancialReport {
    pub pos: PosKpis,
    pub revenue_by_area: BTreeMap<Area, Decimal>,
    pub revenue_total: Decimal,
    pub cogs_by_area: BTreeMap<Area, Decimal>,
    pub cogs_total: Decimal,
    pub gross_margin_by_area: BTreeMap<Area, Decimal>,
    pub gross_margin_total: Decimal,
    pub labor_total: Decimal,
    pub labor_by_area: BTreeMap<Area, Decimal>,
    pub fixed_total: Decimal,
    pub other_costs: Decimal,
    pub operating_margin_total: Decimal,
    pub roi_monthly: Option<Decimal>,
    pub average_stock: Option<Decimal>,
    pub inventory_turnover: Option<Decimal>,
    pub inventory_coverage_days: Option<Decimal>,
    pub period_days: u32,
}

fn validate_all<T: Validate>(name: &str, records: &[T]) -> Result<(), ServiceError> {
    for (index, record) in records.iter().enumerate() {
        record
            .validate()
            .map_err(|e| ServiceError::ValidationError(format!("{}[{}]: {}", name, index, e)))?;
    }
    Ok(())
}

impl KpiInputs {
    pub fn validate_records(&self) -> Result<(), ServiceError> {
        validate_all("pos_lines", &self.pos_lines)?;
        validate_all("sales_invoices", &self.sales_invoices)?;
        validate_all("purchase_invoices", &self.purchase_invoices)?;
        validate_all("labor_costs", &self.labor_costs)?;
        validate_all("fixed_costs", &self.fixed_costs)?;
        validate_all("inventory_snapshots", &self.inventory_snapshots)?;
        validate_all("capital_snapshots", &self.capital_snapshots)?;
        validate_all("price_list", &self.price_list)?;
        if self.other_costs < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "other_costs: must be greater than or equal to 0".to_string(),
            ));
        }
        if self.period_days == Some(0) {
            return Err(ServiceError::ValidationError(
                "period_days: must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.pos_lines
            .iter()
            .map(|l| l.timestamp.date())
            .chain(self.sales_invoices.iter().map(|r| r.date))
            .chain(self.purchase_invoices.iter().map(|r| r.date))
            .chain(self.labor_costs.iter().map(|r| r.date))
            .chain(self.fixed_costs.iter().map(|r| r.date))
            .chain(self.inventory_snapshots.iter().map(|r| r.date))
            .chain(self.capital_snapshots.iter().map(|r| r.date))
    }

    /// Explicit period, or the inclusive span of all record dates (at least 1).
    pub fn effective_period_days(&self) -> u32 {
        if let Some(days) = self.period_days {
            return days.max(1);
        }
        let (min, max) = self.dates().fold((None, None), |(lo, hi), d| {
            (
                Some(lo.map_or(d, |lo: NaiveDate| lo.min(d))),
                Some(hi.map_or(d, |hi: NaiveDate| hi.max(d))),
            )
        });
        match (min, max) {
            (Some(min), Some(max)) => {
                u32::try_from((max - min).num_days() + 1).unwrap_or(u32::MAX).max(1)
            }
            _ => 1,
        }
    }
}

fn round_map(map: &BTreeMap<Area, Decimal>) -> BTreeMap<Area, Decimal> {
    map.iter().map(|(k, v)| (*k, q2(*v))).collect()
}

#[instrument(skip(inputs), fields(pos_lines = inputs.pos_lines.len()))]
pub fn build_financial_report(inputs: &KpiInputs) -> Result<FinancialReport, ServiceError> {
    inputs.validate_records()?;

    let prices = price_index(&inputs.price_list);
    let pos = kpi_pos_only(&inputs.pos_lines, Some(&prices))?;

    let revenue = add_sales_invoices(
        &pos_revenue_by_area(&inputs.pos_lines)?,
        &inputs.sales_invoices,
    )?;
    let revenue_sum = checked_total(revenue.values().copied())?;

    let cogs = compute_cogs(&inputs.purchase_invoices, inputs.alloc_basis.as_ref())?;
    let cogs_sum = checked_total(cogs.values().copied())?;

    let gross_total = revenue_sum.checked_sub(cogs_sum).ok_or(KpiError::Overflow)?;

    let mut labor_by_area: BTreeMap<Area, Vec<Decimal>> = BTreeMap::new();
    for cost in &inputs.labor_costs {
        if let Some(area) = cost.area {
            labor_by_area.entry(area).or_default().push(cost.amount);
        }
    }
    let labor_by_area = labor_by_area
        .into_iter()
        .map(|(area, amounts)| checked_total(amounts).map(|total| (area, total)))
        .collect::<Result<BTreeMap<_, _>, KpiError>>()?;
    let labor_sum = checked_total(inputs.labor_costs.iter().map(|c| c.amount))?;
    let fixed_sum = checked_total(inputs.fixed_costs.iter().map(|c| c.amount))?;

    let operating =
        operating_margin_total(gross_total, labor_sum, fixed_sum, inputs.other_costs)?;

    let roi = match inputs.capital_snapshots.iter().max_by_key(|s| s.date) {
        Some(latest) => roi_monthly(operating, latest.capital_value)?,
        None => None,
    };

    let average_stock = if inputs.inventory_snapshots.is_empty() {
        None
    } else {
        let total = checked_total(inputs.inventory_snapshots.iter().map(|s| s.stock_value))?;
        Some(total / Decimal::from(inputs.inventory_snapshots.len()))
    };
    let turnover = match average_stock {
        Some(avg) => inventory_turnover(cogs_sum, avg)?,
        None => None,
    };

    let period_days = inputs.effective_period_days();
    let daily_consumption = cogs_sum / Decimal::from(period_days);
    let coverage = match inputs.inventory_snapshots.iter().max_by_key(|s| s.date) {
        Some(latest) => inventory_coverage_days(latest.stock_value, daily_consumption)?,
        None => None,
    };

    let report = FinancialReport {
        pos,
        revenue_by_area: round_map(&revenue),
        revenue_total: q2(revenue_sum),
        cogs_by_area: round_map(&cogs),
        cogs_total: q2(cogs_sum),
        gross_margin_by_area: gross_margin_by_area(&revenue, &cogs)?,
        gross_margin_total: q2(gross_total),
        labor_total: q2(labor_sum),
        labor_by_area: round_map(&labor_by_area),
        fixed_total: q2(fixed_sum),
        other_costs: q2(inputs.other_costs),
        operating_margin_total: operating,
        roi_monthly: roi,
        average_stock: average_stock.map(q2),
        inventory_turnover: turnover,
        inventory_coverage_days: coverage,
        period_days,
    };

    info!(
        revenue_total = %report.revenue_total,
        operating_margin = %report.operating_margin_total,
        "built financial report"
    );
    Ok(report)
}
