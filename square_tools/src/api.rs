use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::SquareConfig,
    data_objects::{CreatePaymentLinkRequest, PaymentLink, SquareOrder},
    SquareApiError,
};

#[derive(Clone)]
pub struct SquareApi {
    config: SquareConfig,
    client: Arc<Client>,
}

impl SquareApi {
    pub fn new(config: SquareConfig) -> Result<Self, SquareApiError> {
        let mut headers = HeaderMap::with_capacity(3);
        let bearer = format!("Bearer {}", config.access_token.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| SquareApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        let version =
            HeaderValue::from_str(&config.api_version).map_err(|e| SquareApiError::Initialization(e.to_string()))?;
        headers.insert("Square-Version", version);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SquareApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &SquareConfig {
        &self.config
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, SquareApiError> {
        let url = self.url(path);
        trace!("💳️ Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SquareApiError::Timeout(e.to_string())
            } else {
                SquareApiError::RestResponseError(e.to_string())
            }
        })?;
        if response.status().is_success() {
            trace!("💳️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| SquareApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| SquareApiError::RestResponseError(e.to_string()))?;
            Err(SquareApiError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v2{path}", self.config.base_url())
    }

    pub async fn retrieve_order(&self, order_id: &str) -> Result<SquareOrder, SquareApiError> {
        #[derive(Deserialize)]
        struct OrderResponse {
            order: Option<SquareOrder>,
        }
        let path = format!("/orders/{order_id}");
        debug!("💳️ Fetching order {order_id}");
        let result = self.rest_query::<OrderResponse, ()>(Method::GET, &path, None).await?;
        let order = result.order.ok_or(SquareApiError::EmptyResponse)?;
        info!("💳️ Fetched order {order_id} with {} line items", order.line_items.len());
        Ok(order)
    }

    /// Creates a hosted checkout page for the given order. The order's `location_id` is filled in from the
    /// configuration if it is empty.
    pub async fn create_payment_link(
        &self,
        mut request: CreatePaymentLinkRequest,
    ) -> Result<PaymentLink, SquareApiError> {
        #[derive(Deserialize)]
        struct PaymentLinkResponse {
            payment_link: Option<PaymentLink>,
        }
        if request.order.location_id.is_empty() {
            request.order.location_id = self.config.location_id.clone();
        }
        if request.order.location_id.is_empty() {
            return Err(SquareApiError::RestRequestError("No Square location id has been configured".into()));
        }
        debug!(
            "💳️ Creating payment link for {} line items (idempotency key {})",
            request.order.line_items.len(),
            request.idempotency_key
        );
        let result = self
            .rest_query::<PaymentLinkResponse, CreatePaymentLinkRequest>(
                Method::POST,
                "/online-checkout/payment-links",
                Some(request),
            )
            .await?;
        let link = result.payment_link.ok_or(SquareApiError::EmptyResponse)?;
        info!("💳️ Payment link {} created for order {:?}", link.id, link.order_id);
        Ok(link)
    }
}
