use axum::{extract::rejection::JsonRejection, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    errors::{ApiError, ServiceError},
    handlers::{common::json_body, AppState},
    models::{PosLine, PriceListItem},
    services::{
        kpi::{kpi_pos_only, price_index, PosKpis},
        reports::{build_financial_report, FinancialReport, KpiInputs},
    },
};

/// POS lines with an optional price list for the discount rate
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct PosKpiRequest {
    pub pos_lines: Vec<PosLine>,
    pub price_list: Option<Vec<PriceListItem>>,
}

/// Full financial report over a dataset
#[utoipa::path(
    post,
    path = "/kpi/report",
    request_body = KpiInputs,
    responses(
        (status = 200, description = "Financial report", body = FinancialReport),
        (status = 400, description = "Invalid records or allocation basis", body = crate::errors::ErrorResponse)
    ),
    tag = "KPI"
)]
#[instrument(skip_all)]
pub async fn financial_report(
    payload: Result<Json<KpiInputs>, JsonRejection>,
) -> Result<Json<FinancialReport>, ApiError> {
    let inputs = json_body(payload)?;
    Ok(Json(build_financial_report(&inputs)?))
}

/// POS-only KPIs
#[utoipa::path(
    post,
    path = "/kpi/pos",
    request_body = PosKpiRequest,
    responses(
        (status = 200, description = "POS KPIs", body = PosKpis),
        (status = 400, description = "Invalid POS lines", body = crate::errors::ErrorResponse)
    ),
    tag = "KPI"
)]
#[instrument(skip_all)]
pub async fn pos_kpis(
    payload: Result<Json<PosKpiRequest>, JsonRejection>,
) -> Result<Json<PosKpis>, ApiError> {
    let request = json_body(payload)?;
    let inputs = KpiInputs {
        pos_lines: request.pos_lines,
        price_list: request.price_list.clone().unwrap_or_default(),
        ..KpiInputs::default()
    };
    inputs.validate_records()?;

    let prices = request.price_list.as_deref().map(price_index);
    let kpis = kpi_pos_only(&inputs.pos_lines, prices.as_ref()).map_err(ServiceError::from)?;
    Ok(Json(kpis))
}

pub fn kpi_routes() -> Router<AppState> {
    Router::new()
        .route("/kpi/report", post(financial_report))
        .route("/kpi/pos", post(pos_kpis))
}
