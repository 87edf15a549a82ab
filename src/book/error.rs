//! Order book error types

use super::order::Side;
use crate::types::OrderId;
use std::fmt;

/// Errors that can occur within the order book.
#[derive(Debug)]
#[non_exhaustive]
pub enum BookError {
    /// An order with this id is already indexed by the book.
    DuplicateOrderId(OrderId),

    /// Order not found in the book.
    OrderNotFound(OrderId),

    /// Price failed validation (non-positive for a priced order type).
    InvalidPrice {
        /// The offending price.
        price: i64,
    },

    /// Quantity failed validation (must be strictly positive).
    InvalidQty {
        /// The offending quantity.
        qty: i64,
    },

    /// A post-only order would have crossed the opposite side.
    WouldCross {
        /// The order's limit price.
        price: i64,
        /// The side of the order.
        side: Side,
        /// Best opposite price it would have crossed.
        opposite_price: i64,
    },

    /// Error while serializing snapshot data.
    SerializationError {
        /// Underlying error message.
        message: String,
    },

    /// Error while deserializing snapshot data.
    DeserializationError {
        /// Underlying error message.
        message: String,
    },

    /// Snapshot integrity check failed.
    ChecksumMismatch {
        /// Expected checksum value.
        expected: String,
        /// Actual checksum value.
        actual: String,
    },
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookError::DuplicateOrderId(id) => write!(f, "duplicate order id: {id}"),
            BookError::OrderNotFound(id) => write!(f, "order not found: {id}"),
            BookError::InvalidPrice { price } => write!(f, "invalid price: {price}"),
            BookError::InvalidQty { qty } => write!(f, "invalid quantity: {qty}"),
            BookError::WouldCross {
                price,
                side,
                opposite_price,
            } => {
                write!(
                    f,
                    "post-only {side} at {price} would cross opposite at {opposite_price}"
                )
            }
            BookError::SerializationError { message } => {
                write!(f, "serialization error: {message}")
            }
            BookError::DeserializationError { message } => {
                write!(f, "deserialization error: {message}")
            }
            BookError::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, but computed {actual}")
            }
        }
    }
}

impl std::error::Error for BookError {}
