//! Canonical binary encoding of matching-engine WAL entries.
//!
//! Orders use a fixed-then-variable layout so replay does not depend on any
//! self-describing format:
//!
//! ```text
//! [8: id][8: user_id][1: side][1: kind][8: price][8: qty][8: filled_qty]
//! [1: status][8: created_at][2: symbol_len][symbol bytes]
//! ```
//!
//! All integers are little-endian.

use super::error::WalError;
use super::wal::WalRecord;
use crate::book::{Order, OrderKind, OrderStatus, Side};
use crate::types::OrderId;

/// Record kind: an order submission.
pub const KIND_PLACE_ORDER: u8 = 1;
/// Record kind: an order cancellation.
pub const KIND_CANCEL_ORDER: u8 = 2;
/// Record kind: a checkpoint cut-off marker.
pub const KIND_CHECKPOINT: u8 = 3;

/// A decoded matching-engine WAL entry.
#[derive(Debug, Clone, PartialEq)]
pub enum WalEntry {
    /// An order was submitted.
    PlaceOrder(Order),
    /// An order was canceled by id.
    CancelOrder(OrderId),
    /// A checkpoint completed; entries at or below `cutoff` are reflected
    /// in the checkpoint file.
    Checkpoint {
        /// Sequence cut-off covered by the checkpoint.
        cutoff: u64,
    },
}

impl WalEntry {
    /// The record kind tag for this entry.
    pub fn kind(&self) -> u8 {
        match self {
            WalEntry::PlaceOrder(_) => KIND_PLACE_ORDER,
            WalEntry::CancelOrder(_) => KIND_CANCEL_ORDER,
            WalEntry::Checkpoint { .. } => KIND_CHECKPOINT,
        }
    }

    /// Encodes the entry's data payload.
    pub fn encode_data(&self) -> Vec<u8> {
        match self {
            WalEntry::PlaceOrder(order) => {
                let mut buf = Vec::with_capacity(45 + order.symbol.len());
                encode_order(order, &mut buf);
                buf
            }
            WalEntry::CancelOrder(id) => id.0.to_le_bytes().to_vec(),
            WalEntry::Checkpoint { cutoff } => cutoff.to_le_bytes().to_vec(),
        }
    }

    /// Decodes a raw record into a typed entry.
    ///
    /// # Errors
    /// Returns [`WalError::InvalidRecord`] on an unknown kind or malformed
    /// payload.
    pub fn decode(record: &WalRecord) -> Result<Self, WalError> {
        match record.kind {
            KIND_PLACE_ORDER => {
                let mut pos = 0usize;
                let order = decode_order(&record.data, &mut pos).map_err(|message| {
                    WalError::InvalidRecord {
                        sequence: record.sequence,
                        message,
                    }
                })?;
                Ok(WalEntry::PlaceOrder(order))
            }
            KIND_CANCEL_ORDER => {
                let bytes: [u8; 8] =
                    record
                        .data
                        .as_slice()
                        .try_into()
                        .map_err(|_| WalError::InvalidRecord {
                            sequence: record.sequence,
                            message: "cancel payload must be 8 bytes".to_string(),
                        })?;
                Ok(WalEntry::CancelOrder(OrderId(u64::from_le_bytes(bytes))))
            }
            KIND_CHECKPOINT => {
                let bytes: [u8; 8] =
                    record
                        .data
                        .as_slice()
                        .try_into()
                        .map_err(|_| WalError::InvalidRecord {
                            sequence: record.sequence,
                            message: "checkpoint payload must be 8 bytes".to_string(),
                        })?;
                Ok(WalEntry::Checkpoint {
                    cutoff: u64::from_le_bytes(bytes),
                })
            }
            other => Err(WalError::InvalidRecord {
                sequence: record.sequence,
                message: format!("unknown record kind {other}"),
            }),
        }
    }
}

/// Appends the canonical binary form of `order` to `buf`.
pub fn encode_order(order: &Order, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&order.id.0.to_le_bytes());
    buf.extend_from_slice(&order.user_id.to_le_bytes());
    buf.push(side_tag(order.side));
    buf.push(kind_tag(order.kind));
    buf.extend_from_slice(&order.price.to_le_bytes());
    buf.extend_from_slice(&order.qty.to_le_bytes());
    buf.extend_from_slice(&order.filled_qty.to_le_bytes());
    buf.push(status_tag(order.status));
    buf.extend_from_slice(&order.created_at.to_le_bytes());
    buf.extend_from_slice(&(order.symbol.len() as u16).to_le_bytes());
    buf.extend_from_slice(order.symbol.as_bytes());
}

/// Decodes one order starting at `*pos`, advancing it past the order.
pub fn decode_order(data: &[u8], pos: &mut usize) -> Result<Order, String> {
    let id = OrderId(read_u64(data, pos)?);
    let user_id = read_u64(data, pos)?;
    let side = parse_side(read_u8(data, pos)?)?;
    let kind = parse_kind(read_u8(data, pos)?)?;
    let price = read_i64(data, pos)?;
    let qty = read_i64(data, pos)?;
    let filled_qty = read_i64(data, pos)?;
    let status = parse_status(read_u8(data, pos)?)?;
    let created_at = read_i64(data, pos)?;
    let symbol_len = read_u16(data, pos)? as usize;
    let symbol_end = pos
        .checked_add(symbol_len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| "symbol extends past payload".to_string())?;
    let symbol = std::str::from_utf8(&data[*pos..symbol_end])
        .map_err(|_| "symbol is not valid UTF-8".to_string())?
        .to_string();
    *pos = symbol_end;

    Ok(Order {
        id,
        user_id,
        symbol,
        side,
        kind,
        price,
        qty,
        filled_qty,
        status,
        created_at,
    })
}

fn side_tag(side: Side) -> u8 {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

fn kind_tag(kind: OrderKind) -> u8 {
    match kind {
        OrderKind::Limit => 0,
        OrderKind::Market => 1,
        OrderKind::Ioc => 2,
        OrderKind::Fok => 3,
        OrderKind::PostOnly => 4,
        OrderKind::Gtc => 5,
    }
}

fn status_tag(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::New => 0,
        OrderStatus::PartiallyFilled => 1,
        OrderStatus::Filled => 2,
        OrderStatus::Canceled => 3,
        OrderStatus::Rejected => 4,
    }
}

fn parse_side(tag: u8) -> Result<Side, String> {
    match tag {
        0 => Ok(Side::Buy),
        1 => Ok(Side::Sell),
        other => Err(format!("unknown side tag {other}")),
    }
}

fn parse_kind(tag: u8) -> Result<OrderKind, String> {
    match tag {
        0 => Ok(OrderKind::Limit),
        1 => Ok(OrderKind::Market),
        2 => Ok(OrderKind::Ioc),
        3 => Ok(OrderKind::Fok),
        4 => Ok(OrderKind::PostOnly),
        5 => Ok(OrderKind::Gtc),
        other => Err(format!("unknown order kind tag {other}")),
    }
}

fn parse_status(tag: u8) -> Result<OrderStatus, String> {
    match tag {
        0 => Ok(OrderStatus::New),
        1 => Ok(OrderStatus::PartiallyFilled),
        2 => Ok(OrderStatus::Filled),
        3 => Ok(OrderStatus::Canceled),
        4 => Ok(OrderStatus::Rejected),
        other => Err(format!("unknown status tag {other}")),
    }
}

fn read_u8(data: &[u8], pos: &mut usize) -> Result<u8, String> {
    let byte = *data.get(*pos).ok_or("payload too short")?;
    *pos += 1;
    Ok(byte)
}

fn read_u16(data: &[u8], pos: &mut usize) -> Result<u16, String> {
    let end = *pos + 2;
    let bytes: [u8; 2] = data
        .get(*pos..end)
        .ok_or("payload too short")?
        .try_into()
        .map_err(|_| "payload too short".to_string())?;
    *pos = end;
    Ok(u16::from_le_bytes(bytes))
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64, String> {
    let end = *pos + 8;
    let bytes: [u8; 8] = data
        .get(*pos..end)
        .ok_or("payload too short")?
        .try_into()
        .map_err(|_| "payload too short".to_string())?;
    *pos = end;
    Ok(u64::from_le_bytes(bytes))
}

fn read_i64(data: &[u8], pos: &mut usize) -> Result<i64, String> {
    Ok(read_u64(data, pos)? as i64)
}
