//! Request handler definitions
//!
//! Define each route and its handler here. Handlers stay short: the work happens in the checkout engine APIs, which
//! are handed to the server as `web::Data`.
//!
//! Every engine call is async. Handlers must never block the worker thread they run on, since each actix worker
//! processes its requests sequentially.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use checkout_engine::{
    coupon_objects::{NewGlobalCouponRequest, NewUserCouponRequest},
    db_types::{CartLine, Role},
    helpers::SIGNATURE_HEADER,
    order_objects::CheckoutRequest,
    CartApi,
    CheckoutApi,
    CouponApi,
    OrderApi,
    PaymentProcessor,
    PaymentReconciler,
    StorefrontDatabase,
};
use log::*;
use serde_json::json;

use crate::{
    auth::JwtClaims,
    config::ServerConfig,
    data_objects::{
        CheckoutResponse,
        ClaimCouponRequest,
        CouponSearchParams,
        JsonResponse,
        MyCouponsParams,
        VariantParam,
    },
    errors::ServerError,
    helpers::get_remote_ip,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Square  ----------------------------------------------------
route!(square_webhook => Post "/webhooks/square" impl StorefrontDatabase, PaymentProcessor);
/// Route handler for Square payment notifications
///
/// The body is taken as raw bytes, because the signature in the `x-square-hmacsha256-signature` header is computed
/// over the exact bytes Square sent. Every notification that passes signature verification is acknowledged with a
/// 200, whatever became of it, so that Square stops redelivering events that can never succeed. A bad signature is
/// answered with a 401.
///
/// When `SFS_NACK_RETRYABLE_EVENTS` is set, events that failed for a transient reason (e.g. the order could not be
/// retrieved from Square in time) get a 503 instead, and Square will deliver them again later.
pub async fn square_webhook<B, P>(
    req: HttpRequest,
    body: Bytes,
    api: web::Data<PaymentReconciler<B, P>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    P: PaymentProcessor,
{
    let peer = get_remote_ip(&req, config.use_x_forwarded_for, config.use_forwarded);
    debug!("💻️ Received Square notification ({} bytes) from {peer:?}", body.len());
    let signature = req.headers().get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = api.handle_webhook(signature, &body).await;
    if outcome.is_bad_signature() {
        warn!("💻️ Square notification from {peer:?} failed signature verification");
        return Err(ServerError::InvalidWebhookSignature);
    }
    if outcome.is_retryable() && config.webhooks.nack_retryable_events {
        info!("💻️ Asking Square to redeliver the notification later");
        return Ok(HttpResponse::ServiceUnavailable().json(json!({ "received": false, "result": outcome })));
    }
    Ok(HttpResponse::Ok().json(json!({ "received": true, "result": outcome })))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl StorefrontDatabase, PaymentProcessor);
/// Route handler for the checkout endpoint
///
/// Prices the caller's cart, applies the coupon (by id or by code, never both) and opens a hosted payment page. The
/// response carries the page URL: `{ "url": "https://..." }`. The cart is left untouched; it is cleared once the
/// payment has been confirmed.
pub async fn checkout<B, P>(
    claims: JwtClaims,
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase,
    P: PaymentProcessor,
{
    debug!("💻️ POST checkout for {}", claims.sub);
    let session = api.create_session(&claims.sub, body.into_inner()).await.map_err(|e| {
        debug!("💻️ Checkout for {} failed. {e}", claims.sub);
        ServerError::from(e)
    })?;
    info!("💻️ Checkout session {} opened for {}", session.external_order_id, claims.sub);
    Ok(HttpResponse::Ok().json(CheckoutResponse { url: session.url }))
}

//----------------------------------------------   Cart  ----------------------------------------------------
route!(my_cart => Get "/cart" impl StorefrontDatabase);
pub async fn my_cart<B: StorefrontDatabase>(
    claims: JwtClaims,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET cart for {}", claims.sub);
    let cart = api.fetch_cart(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(update_cart => Put "/cart" impl StorefrontDatabase);
/// Sets the quantity of one product in the caller's cart. Quantities are clamped to the stock on hand, and sold-out
/// products are dropped from the cart. Returns the updated cart.
pub async fn update_cart<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<CartLine>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let line = body.into_inner();
    debug!("💻️ PUT cart line for product #{} for {}", line.product_id, claims.sub);
    let cart = api.upsert_line(&claims.sub, line).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(remove_cart_line => Delete "/cart/{product_id}" impl StorefrontDatabase);
pub async fn remove_cart_line<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    query: web::Query<VariantParam>,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    debug!("💻️ DELETE cart line for product #{product_id} for {}", claims.sub);
    let cart = api.remove_line(&claims.sub, product_id, query.variant.as_deref()).await?;
    Ok(HttpResponse::Ok().json(cart))
}

route!(clear_cart => Delete "/cart" impl StorefrontDatabase);
pub async fn clear_cart<B: StorefrontDatabase>(
    claims: JwtClaims,
    api: web::Data<CartApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ DELETE cart for {}", claims.sub);
    let removed = api.clear(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{removed} items removed from your cart"))))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(my_orders => Get "/orders" impl StorefrontDatabase);
/// Route handler for the orders endpoint
///
/// Authenticated users fetch their own orders here, newest first. Admins can look up any order with
/// `/admin/orders/{id}`.
pub async fn my_orders<B: StorefrontDatabase>(
    claims: JwtClaims,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {}", claims.sub);
    let orders = api.orders_for_user(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(my_order => Get "/orders/{id}" impl StorefrontDatabase);
pub async fn my_order<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order #{order_id} for {}", claims.sub);
    let order = api.order_for_user(&claims.sub, order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(order_by_id => Get "/admin/orders/{id}" impl StorefrontDatabase where requires [Role::Admin]);
pub async fn order_by_id<B: StorefrontDatabase>(
    path: web::Path<i64>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order #{order_id}");
    let order = api.order_by_id(order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Coupons  ----------------------------------------------------
route!(my_coupons => Get "/coupons" impl StorefrontDatabase);
/// Lists the caller's personal coupons, including copies claimed from global coupons. Pass `only_valid=true` to
/// leave out used, expired and not-yet-active coupons. Paginated with `page` (from 1) and `limit` (up to 50).
pub async fn my_coupons<B: StorefrontDatabase>(
    claims: JwtClaims,
    query: web::Query<MyCouponsParams>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET coupons for {}", claims.sub);
    let pagination = query.pagination()?;
    let coupons = api.my_coupons(&claims.sub, query.only_valid, pagination).await?;
    Ok(HttpResponse::Ok().json(coupons))
}

route!(my_coupon => Get "/coupons/{id}" impl StorefrontDatabase);
pub async fn my_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let coupon_id = path.into_inner();
    debug!("💻️ GET coupon #{coupon_id} for {}", claims.sub);
    let coupon = api.my_coupon(&claims.sub, coupon_id).await?;
    Ok(HttpResponse::Ok().json(coupon))
}

route!(validate_coupon => Get "/coupons/validate/{code}" impl StorefrontDatabase);
/// Checks whether the caller could use a coupon code right now. Nothing is claimed or consumed.
pub async fn validate_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = path.into_inner();
    debug!("💻️ GET validate coupon [{code}] for {}", claims.sub);
    let validation = api.validate_code(&claims.sub, &code).await?;
    Ok(HttpResponse::Ok().json(validation))
}

route!(claim_coupon => Post "/coupons/claim" impl StorefrontDatabase);
/// Copies a global coupon into the caller's personal coupons. Claiming a code twice returns the copy from the first
/// claim.
pub async fn claim_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<ClaimCouponRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST claim coupon [{}] for {}", body.code, claims.sub);
    let coupon = api.claim(&claims.sub, &body.code).await?;
    Ok(HttpResponse::Ok().json(coupon))
}

route!(create_user_coupon => Post "/admin/coupons/user" impl StorefrontDatabase where requires [Role::Admin]);
pub async fn create_user_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<NewUserCouponRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST personal coupon [{}] for {} by {}", request.code, request.user_id, claims.sub);
    let coupon = api.create_user_coupon(request, &claims.sub).await?;
    Ok(HttpResponse::Created().json(coupon))
}

route!(create_global_coupon => Post "/admin/coupons/global" impl StorefrontDatabase where requires [Role::Admin]);
pub async fn create_global_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    body: web::Json<NewGlobalCouponRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST global coupon [{}] by {}", request.code, claims.sub);
    let coupon = api.create_global_coupon(request, &claims.sub).await?;
    Ok(HttpResponse::Created().json(coupon))
}

route!(search_coupons => Get "/admin/coupons" impl StorefrontDatabase where requires [Role::Admin]);
/// Searches all coupons. Filter with `scope` (`user` or `global`), `assigned_to` and `code` (a fragment of the code),
/// and paginate with `page` and `limit`.
pub async fn search_coupons<B: StorefrontDatabase>(
    query: web::Query<CouponSearchParams>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET coupon search {query:?}");
    let pagination = query.pagination()?;
    let coupons = api.search_coupons(query.filter(), pagination).await?;
    Ok(HttpResponse::Ok().json(coupons))
}

route!(delete_coupon => Delete "/admin/coupons/{id}" impl StorefrontDatabase where requires [Role::Admin]);
pub async fn delete_coupon<B: StorefrontDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let coupon_id = path.into_inner();
    info!("💻️ DELETE coupon #{coupon_id} by {}", claims.sub);
    api.delete_coupon(coupon_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Coupon #{coupon_id} deleted"))))
}
