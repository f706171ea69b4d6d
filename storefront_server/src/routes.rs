//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g.
//! I/O, database operations, etc.) must be expressed as futures or asynchronous functions. Every handler here is
//! async and suspends on each store or provider call.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use storefront_engine::{
    db_types::OrderId,
    order_objects::{CheckoutRequest, PaymentOutcome, PaymentSignal, ReconcileOutcome, SignalSource},
    AccountApi,
    CatalogApi,
    OrderFlowApi,
    OrderFlowError,
    StorefrontDatabase,
};
use storefront_engine::{db_types::NewProduct, traits::PaymentProvider};

use crate::{
    data_objects::{
        CartUpdateRequest,
        CreateIntentRequest,
        CreateIntentResponse,
        CreateOrderRequest,
        CreateOrderResponse,
        JsonResponse,
        NewProductRequest,
        PaymentResultRequest,
        UpdateStatusRequest,
        WebhookEnvelope,
    },
    errors::ServerError,
    middleware::VerifiedUser,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders   ----------------------------------------------------
/// Route handler for checkout.
///
/// The total charge is computed server-side from the catalog; the client may send an estimate purely as a
/// consistency check. Cash orders commit as `Placed` immediately; online orders are stored as `AwaitingPayment`
/// and the response tells the client to proceed to payment.
pub async fn create_order<B: StorefrontDatabase>(
    user: VerifiedUser,
    body: web::Json<CreateOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    debug!("💻️ POST checkout for {}", user.user_id);
    let receipt = api
        .checkout(CheckoutRequest {
            buyer_id: user.user_id,
            address_id: req.address_id,
            items: req.items,
            payment_method: req.payment_method,
            client_estimated_amount: req.client_estimated_amount,
        })
        .await?;
    Ok(HttpResponse::Ok().json(CreateOrderResponse {
        order_id: receipt.order.id,
        amount: receipt.order.amount,
        next_action: receipt.next_action,
    }))
}

pub async fn my_orders<B: StorefrontDatabase>(
    user: VerifiedUser,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", user.user_id);
    let orders = api.orders_for_buyer(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

pub async fn order_by_id<B: StorefrontDatabase>(
    user: VerifiedUser,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order {order_id} for {}", user.user_id);
    let order = api.order_for_buyer(&order_id, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn cancel_order<B: StorefrontDatabase>(
    user: VerifiedUser,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST cancel {order_id} by {}", user.user_id);
    let order = api.cancel_order(&order_id, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// Route handler for seller fulfillment updates.
///
/// The acting user must be the seller of at least one line item in the order. Rejections carry the specific
/// reason (e.g. the order is already delivered) so the seller dashboard can show it.
pub async fn set_order_status<B: StorefrontDatabase>(
    user: VerifiedUser,
    path: web::Path<OrderId>,
    body: web::Json<UpdateStatusRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let new_status = body.into_inner().new_status;
    debug!("💻️ POST set status of {order_id} to {new_status} by {}", user.user_id);
    let order = api.set_fulfillment_status(&order_id, new_status, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------  Payments  ----------------------------------------------------
pub async fn create_payment_intent<B: StorefrontDatabase, P: PaymentProvider + 'static>(
    user: VerifiedUser,
    body: web::Json<CreateIntentRequest>,
    api: web::Data<OrderFlowApi<B>>,
    provider: web::Data<P>,
) -> Result<HttpResponse, ServerError> {
    let order_id = body.into_inner().order_id;
    debug!("💻️ POST create payment intent for {order_id} by {}", user.user_id);
    let intent = api.create_payment_intent(&order_id, &user.user_id, provider.get_ref()).await?;
    Ok(HttpResponse::Ok()
        .json(CreateIntentResponse { intent_id: intent.intent_id, client_secret: intent.client_secret }))
}

/// Route handler for the buyer's browser reporting an SDK result after interactive confirmation.
///
/// The report is a hint only: the provider is queried for the authoritative intent status, and only a
/// provider-verified terminal outcome is fed into the reconciliation path. A still-pending intent leaves the order
/// untouched — the webhook or the sweep resolves it later.
pub async fn payment_result<B: StorefrontDatabase, P: PaymentProvider + 'static>(
    user: VerifiedUser,
    path: web::Path<OrderId>,
    body: web::Json<PaymentResultRequest>,
    api: web::Data<OrderFlowApi<B>>,
    provider: web::Data<P>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let intent_id = body.into_inner().intent_id;
    debug!("💻️ POST client payment result for {order_id} (intent {intent_id})");
    let outcome = api.verify_client_result(&user.user_id, &order_id, &intent_id, provider.get_ref()).await?;
    let order = match outcome {
        ReconcileOutcome::Applied(order) | ReconcileOutcome::Unresolved(order) => order,
        ReconcileOutcome::AlreadyProcessed(recorded) => {
            return Ok(HttpResponse::Ok().json(recorded));
        },
    };
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------  Webhooks  ----------------------------------------------------
/// Route handler for the payment provider's signed webhook.
///
/// Signature verification happens in the HMAC middleware wrapping this scope, and fails closed; by the time this
/// handler runs the body is authentic. Terminal intent events are normalized into payment signals; everything else
/// is acknowledged and ignored. Responses are kept in the 200 range for outcomes where redelivery cannot help
/// (duplicates, permanent conflicts); transient failures return 5xx so the provider redelivers.
pub async fn payment_webhook<B: StorefrontDatabase>(
    body: web::Bytes,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!("🪝️ Could not parse webhook payload: {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    trace!("🪝️ Received webhook event {} ({})", envelope.id, envelope.event_type);
    let intent = envelope.data.object;
    let outcome = match envelope.event_type.as_str() {
        "payment_intent.succeeded" => PaymentOutcome::Succeeded,
        "payment_intent.payment_failed" => {
            let reason = intent
                .last_payment_error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| "payment failed".to_string());
            PaymentOutcome::Failed { reason }
        },
        other => {
            debug!("🪝️ Ignoring webhook event type {other}");
            return Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Ignored event type {other}"))));
        },
    };
    let order_id = intent.metadata.order_id.clone().ok_or_else(|| {
        warn!("🪝️ Webhook event {} carries no order id in its metadata", envelope.id);
        ServerError::InvalidRequestBody("intent metadata carries no order id".to_string())
    })?;
    let signal = PaymentSignal {
        order_id: OrderId::from(order_id),
        payment_ref: intent.id,
        outcome,
        source: SignalSource::Webhook,
    };
    match api.process_payment_signal(signal).await {
        Ok(ReconcileOutcome::Applied(order)) => {
            info!("🪝️ Webhook {} applied: order {} is now {}", envelope.id, order.id, order.fulfillment_status);
            Ok(HttpResponse::Ok().json(JsonResponse::success("Webhook processed.")))
        },
        Ok(ReconcileOutcome::AlreadyProcessed(_)) => {
            info!("🪝️ Webhook {} was a duplicate delivery; no side effects re-applied", envelope.id);
            Ok(HttpResponse::Ok().json(JsonResponse::success("Duplicate delivery.")))
        },
        Ok(ReconcileOutcome::Unresolved(_)) => Ok(HttpResponse::Ok().json(JsonResponse::success("No outcome yet."))),
        // A conflicting or illegal signal is flagged for a human; redelivery cannot fix it, so acknowledge it.
        Err(OrderFlowError::Transition(e)) => {
            error!("🪝️ Webhook {} conflicts with the order's recorded state: {e}. Flagged for manual review.", envelope.id);
            Ok(HttpResponse::Ok().json(JsonResponse::failure(e)))
        },
        // The order may simply not have committed yet; a non-2xx makes the provider redeliver later.
        Err(OrderFlowError::OrderNotFound(id)) => {
            warn!("🪝️ Webhook {} references unknown order {id}; asking the provider to redeliver", envelope.id);
            Err(ServerError::NoRecordFound(format!("order {id}")))
        },
        Err(e) => Err(e.into()),
    }
}

//----------------------------------------------    Carts   ----------------------------------------------------
pub async fn my_cart<B: StorefrontDatabase>(
    user: VerifiedUser,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let cart = api.cart(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(cart))
}

pub async fn update_cart<B: StorefrontDatabase>(
    user: VerifiedUser,
    body: web::Json<CartUpdateRequest>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let cart = api.update_cart(&user.user_id, body.into_inner().items).await?;
    Ok(HttpResponse::Ok().json(cart))
}

//----------------------------------------------  Addresses ----------------------------------------------------
pub async fn add_address<B: StorefrontDatabase>(
    user: VerifiedUser,
    body: web::Json<storefront_engine::db_types::NewAddress>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let address = api.add_address(&user.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(address))
}

pub async fn my_addresses<B: StorefrontDatabase>(
    user: VerifiedUser,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let addresses = api.addresses(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(addresses))
}

//----------------------------------------------   Catalog  ----------------------------------------------------
pub async fn add_product<B: StorefrontDatabase>(
    user: VerifiedUser,
    body: web::Json<NewProductRequest>,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    let product = api
        .add_product(NewProduct {
            seller_id: user.user_id,
            name: req.name,
            description: req.description,
            list_price: req.list_price,
            offer_price: req.offer_price,
            stock: req.stock,
            category: req.category,
            variants: req.variants,
        })
        .await?;
    Ok(HttpResponse::Ok().json(product))
}

pub async fn catalog<B: StorefrontDatabase>(api: web::Data<CatalogApi<B>>) -> Result<HttpResponse, ServerError> {
    let products = api.catalog().await?;
    Ok(HttpResponse::Ok().json(products))
}

pub async fn product_by_id<B: StorefrontDatabase>(
    path: web::Path<String>,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner().into();
    let product = api.product(&id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("product {id}")))?;
    Ok(HttpResponse::Ok().json(product))
}
