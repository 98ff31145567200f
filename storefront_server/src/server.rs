use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use checkout_engine::{
    CartApi,
    CheckoutApi,
    CouponApi,
    OrderApi,
    PaymentProcessor,
    PaymentReconciler,
    SqliteDatabase,
};
use log::*;
use square_tools::SquareApi;

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    integrations::square::SquarePaymentProcessor,
    middleware::JwtAuthMiddlewareFactory,
    routes::{
        health,
        CheckoutRoute,
        ClaimCouponRoute,
        ClearCartRoute,
        CreateGlobalCouponRoute,
        CreateUserCouponRoute,
        DeleteCouponRoute,
        MyCartRoute,
        MyCouponRoute,
        MyCouponsRoute,
        MyOrderRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        RemoveCartLineRoute,
        SearchCouponsRoute,
        SquareWebhookRoute,
        UpdateCartRoute,
        ValidateCouponRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let square = SquareApi::new(config.square.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("💻️ Using the Square {} environment", config.square.environment);
    let processor = SquarePaymentProcessor::new(square);
    let srv = create_server_instance(config, db, processor)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance<P>(config: ServerConfig, db: SqliteDatabase, processor: P) -> Result<Server, ServerError>
where P: PaymentProcessor + Clone + Send + 'static {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let config = config.clone();
        let db = db.clone();
        let processor = processor.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfs::access_log"))
            .configure(move |cfg| configure_app(cfg, config, db, processor))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the engine APIs and every route. Everything under `/api` requires a bearer token.
pub fn configure_app<P>(cfg: &mut web::ServiceConfig, config: ServerConfig, db: SqliteDatabase, processor: P)
where P: PaymentProcessor + Clone + 'static {
    let checkout_api = CheckoutApi::new(db.clone(), processor.clone(), config.checkout_config());
    let reconciler = PaymentReconciler::new(db.clone(), processor, config.reconciler_config());
    let issuer = TokenIssuer::new(&config.auth);
    let auth_scope = web::scope("/api")
        .wrap(JwtAuthMiddlewareFactory::new(issuer))
        .service(CheckoutRoute::<SqliteDatabase, P>::new())
        .service(MyCartRoute::<SqliteDatabase>::new())
        .service(UpdateCartRoute::<SqliteDatabase>::new())
        .service(RemoveCartLineRoute::<SqliteDatabase>::new())
        .service(ClearCartRoute::<SqliteDatabase>::new())
        .service(MyOrdersRoute::<SqliteDatabase>::new())
        .service(MyOrderRoute::<SqliteDatabase>::new())
        .service(OrderByIdRoute::<SqliteDatabase>::new())
        .service(MyCouponsRoute::<SqliteDatabase>::new())
        .service(ValidateCouponRoute::<SqliteDatabase>::new())
        .service(ClaimCouponRoute::<SqliteDatabase>::new())
        .service(MyCouponRoute::<SqliteDatabase>::new())
        .service(CreateUserCouponRoute::<SqliteDatabase>::new())
        .service(CreateGlobalCouponRoute::<SqliteDatabase>::new())
        .service(SearchCouponsRoute::<SqliteDatabase>::new())
        .service(DeleteCouponRoute::<SqliteDatabase>::new());
    cfg.app_data(web::Data::new(CouponApi::new(db.clone())))
        .app_data(web::Data::new(CartApi::new(db.clone())))
        .app_data(web::Data::new(OrderApi::new(db)))
        .app_data(web::Data::new(checkout_api))
        .app_data(web::Data::new(reconciler))
        .app_data(web::Data::new(config))
        .service(health)
        .service(SquareWebhookRoute::<SqliteDatabase, P>::new())
        .service(auth_scope);
}
