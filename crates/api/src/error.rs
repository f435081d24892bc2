//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, PaymentError};
use domain::{DomainError, LedgerError, OrderError};
use store::{Retryable, StoreError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client.
    BadRequest(String),
    Domain(DomainError),
    Checkout(CheckoutError),
    Payment(PaymentError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => domain_status(err),
            ApiError::Checkout(err) => match err {
                CheckoutError::EmptyCart | CheckoutError::CartInvalid { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CheckoutError::Catalog(_) => StatusCode::SERVICE_UNAVAILABLE,
                CheckoutError::Domain(err) => domain_status(err),
                CheckoutError::Store(err) => store_status(err),
            },
            ApiError::Payment(err) => match err {
                PaymentError::ProviderNotConfigured(_) => StatusCode::BAD_REQUEST,
                PaymentError::Declined(_) => StatusCode::PAYMENT_REQUIRED,
                PaymentError::VerificationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::Provider(_) => StatusCode::BAD_GATEWAY,
                PaymentError::UnknownProvider(_) | PaymentError::RefundNotRecorded { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                PaymentError::Domain(err) => domain_status(err),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Domain(err) => err.public_message(),
            ApiError::Checkout(err) => err.public_message(),
            ApiError::Payment(err) => err.public_message(),
        }
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Ledger(err) => match err {
            LedgerError::InsufficientStock { .. } | LedgerError::InvalidState { .. } => {
                StatusCode::CONFLICT
            }
            LedgerError::InvalidQuantity => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        },
        DomainError::Order(err) => match err {
            OrderError::InvalidTransition { .. } | OrderError::NotCancellable { .. } => {
                StatusCode::CONFLICT
            }
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        },
        DomainError::Store(err) => store_status(err),
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    if err.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = ?self, status = status.as_u16(), "request rejected");
        }

        let mut body = serde_json::json!({ "error": self.message() });
        if let ApiError::Checkout(CheckoutError::CartInvalid { issues }) = &self {
            body["issues"] = serde_json::to_value(issues).unwrap_or_default();
        }
        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

#[cfg(test)]
mod tests {
    use checkout::RefundReceipt;
    use common::{OrderId, OrderStatus, ProductId};

    use super::*;

    #[test]
    fn business_outcomes_map_to_client_errors() {
        let cases = [
            (
                ApiError::from(DomainError::from(LedgerError::InsufficientStock {
                    product_id: ProductId::new("SKU-1"),
                    requested: 4,
                    available: 3,
                })),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(DomainError::from(OrderError::InvalidTransition {
                    from: OrderStatus::Created,
                    to: OrderStatus::Shipped,
                })),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(DomainError::from(OrderError::NotFound(OrderId::new()))),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(CheckoutError::EmptyCart),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(DomainError::from(LedgerError::InvalidQuantity)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err:?}");
        }
    }

    #[test]
    fn exhausted_conflicts_are_unavailable_and_other_failures_are_internal() {
        let conflict = ApiError::from(DomainError::from(StoreError::Conflict {
            entity: "inventory",
            id: "SKU-1".into(),
        }));
        assert_eq!(conflict.status(), StatusCode::SERVICE_UNAVAILABLE);

        let broken = ApiError::from(CheckoutError::Store(StoreError::InvalidRecord(
            "row 7".into(),
        )));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(broken.message(), domain::GENERIC_RETRY_MESSAGE);
    }

    #[test]
    fn unrecorded_refund_is_internal_and_names_the_refund() {
        let order_id = OrderId::new();
        let err = ApiError::from(PaymentError::RefundNotRecorded {
            order_id,
            receipt: RefundReceipt {
                reference: "CARD-000001".into(),
                refund_id: "RF-CARD-000001".into(),
                amount: common::Money::from_cents(5_500),
            },
            source: DomainError::from(OrderError::InvalidTransition {
                from: OrderStatus::Processing,
                to: OrderStatus::Refunded,
            }),
        });

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message().contains("RF-CARD-000001"));
        assert!(err.message().contains(&order_id.to_string()));
    }
}
