//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, LineItem, OrderId, OrderStatus};
use domain::{LineItemRequest, Order, OrderDetails, OrderPatch, OrderService};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub order_service: OrderService<S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: CustomerId,
    pub items: Vec<LineItemRequest>,
}

/// Body of `PATCH /orders/{id}`. Only these fields may be changed.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderRequest {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub items: Option<Vec<LineItemRequest>>,
}

impl From<UpdateOrderRequest> for OrderPatch {
    fn from(req: UpdateOrderRequest) -> Self {
        OrderPatch {
            customer_id: req.customer_id,
            items: req.items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub created_at: String,
    pub items: Vec<LineItemResponse>,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub id: String,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
        }
    }
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            status: order.status.to_string(),
            created_at: order.created_at.to_rfc3339(),
            items: order.items.iter().map(LineItemResponse::from).collect(),
            total_cents: order.total.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct LineItemDetailsResponse {
    pub id: String,
    pub product_id: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// A complete order: header, customer and resolved products.
#[derive(Serialize)]
pub struct OrderDetailsResponse {
    pub id: String,
    pub status: String,
    pub created_at: String,
    pub customer: CustomerResponse,
    pub items: Vec<LineItemDetailsResponse>,
    pub total_cents: i64,
}

impl From<OrderDetails> for OrderDetailsResponse {
    fn from(details: OrderDetails) -> Self {
        let OrderDetails {
            order,
            customer,
            items,
        } = details;

        Self {
            id: order.id.to_string(),
            status: order.status.to_string(),
            created_at: order.created_at.to_rfc3339(),
            customer: CustomerResponse {
                id: customer.id.to_string(),
                name: customer.name,
            },
            items: items
                .into_iter()
                .map(|line| LineItemDetailsResponse {
                    id: line.item.id.to_string(),
                    product_id: line.product.id.to_string(),
                    description: line.product.description,
                    quantity: line.item.quantity,
                    unit_price_cents: line.item.unit_price.cents(),
                })
                .collect(),
            total_cents: order.total.cents(),
        }
    }
}

// -- Handlers --

/// POST /orders: place a new order, reserving stock for every item.
#[tracing::instrument(skip(state, req), fields(customer_id = %req.customer_id))]
pub async fn place<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .order_service
        .place_order(req.customer_id, req.items)
        .await?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// GET /orders/{id}: load an order with its customer and products.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailsResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let details = state
        .order_service
        .fetch_complete(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderDetailsResponse::from(details)))
}

/// PATCH /orders/{id}: reassign the customer and/or replace the items.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .order_service
        .update_order(order_id, OrderPatch::from(req))
        .await?;

    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/{id}: delete an order, releasing any stock it holds.
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let order_id = parse_order_id(&id)?;
    state.order_service.delete_order(order_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /orders/{id}/status: move an order to another status.
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .order_service
        .change_status(order_id, status)
        .await?;

    Ok(Json(OrderResponse::from(&order)))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse::<OrderId>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
