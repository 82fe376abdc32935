// SPDX-License-Identifier: MIT
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct CompanyIdParams {
    company_id: i64,
}

/// `insights.company` — full read-only rollup for one company.
pub async fn company(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CompanyIdParams = serde_json::from_value(params)?;
    let insights = ctx.insights.company_insights(p.company_id).await?;
    Ok(serde_json::to_value(insights)?)
}
