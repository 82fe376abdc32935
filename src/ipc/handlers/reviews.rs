// SPDX-License-Identifier: MIT
use crate::reviews::{CreateReview, UpdateReview};
use crate::tickets::model::Actor;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct CreateParams {
    actor: Actor,
    #[serde(flatten)]
    review: CreateReview,
}

#[derive(Deserialize)]
struct UpdateParams {
    actor: Actor,
    review_id: i64,
    #[serde(flatten)]
    patch: UpdateReview,
}

#[derive(Deserialize)]
struct ReviewIdParams {
    actor: Actor,
    review_id: i64,
}

#[derive(Deserialize)]
struct PublishParams {
    actor: Actor,
    review_id: i64,
    published: Option<bool>,
}

#[derive(Deserialize)]
struct FeatureParams {
    actor: Actor,
    review_id: i64,
    featured: Option<bool>,
}

#[derive(Deserialize)]
struct ListParams {
    actor: Actor,
    company_id: i64,
}

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: CreateParams = serde_json::from_value(params)?;
    let review = ctx.reviews.create(p.actor, &p.review).await?;
    Ok(serde_json::to_value(review)?)
}

pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: UpdateParams = serde_json::from_value(params)?;
    let review = ctx.reviews.update(p.actor, p.review_id, &p.patch).await?;
    Ok(serde_json::to_value(review)?)
}

pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ReviewIdParams = serde_json::from_value(params)?;
    ctx.reviews.delete(p.actor, p.review_id).await?;
    Ok(json!({ "deleted": true }))
}

pub async fn publish(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: PublishParams = serde_json::from_value(params)?;
    let review = ctx
        .reviews
        .set_published(p.actor, p.review_id, p.published.unwrap_or(true))
        .await?;
    Ok(serde_json::to_value(review)?)
}

pub async fn feature(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: FeatureParams = serde_json::from_value(params)?;
    let review = ctx
        .reviews
        .set_featured(p.actor, p.review_id, p.featured.unwrap_or(true))
        .await?;
    Ok(serde_json::to_value(review)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: ListParams = serde_json::from_value(params)?;
    let reviews = ctx.reviews.list_company(p.actor, p.company_id).await?;
    Ok(json!(reviews))
}
