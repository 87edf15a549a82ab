//! Price-ordered index of levels for one side of the book.
//!
//! A thin wrapper over `BTreeMap` that fixes the iteration direction to
//! best-price-first for its side: descending for bids, ascending for asks.
//! The level is owned by its map node; removing the node destroys the level.

use super::level::PriceLevel;
use super::order::Side;
use std::collections::BTreeMap;

/// One side of the order book, keyed by price.
#[derive(Debug)]
pub struct Ladder {
    side: Side,
    levels: BTreeMap<i64, PriceLevel>,
}

impl Ladder {
    /// Creates an empty ladder for `side`.
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// The side this ladder indexes.
    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of non-empty price levels.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the ladder has no levels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Best price: highest bid or lowest ask.
    #[inline]
    pub fn best(&self) -> Option<i64> {
        match self.side {
            Side::Buy => self.levels.last_key_value().map(|(price, _)| *price),
            Side::Sell => self.levels.first_key_value().map(|(price, _)| *price),
        }
    }

    /// The level at the best price.
    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.last_key_value().map(|(_, level)| level),
            Side::Sell => self.levels.first_key_value().map(|(_, level)| level),
        }
    }

    /// Mutable access to the level at the best price.
    pub fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        match self.side {
            Side::Buy => self.levels.last_entry().map(|entry| entry.into_mut()),
            Side::Sell => self.levels.first_entry().map(|entry| entry.into_mut()),
        }
    }

    /// Looks up the level at `price`.
    pub fn get(&self, price: i64) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    /// Mutable lookup of the level at `price`.
    pub fn get_mut(&mut self, price: i64) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Returns the level at `price`, creating it if absent.
    pub fn insert_or_get(&mut self, price: i64) -> &mut PriceLevel {
        self.levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price))
    }

    /// Deletes the level at `price`, dropping its FIFO.
    pub fn remove(&mut self, price: i64) -> Option<PriceLevel> {
        self.levels.remove(&price)
    }

    /// Iterates levels best-price-first.
    pub fn iter_best_first(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// The top `n` levels as `(price, total_qty)` pairs, best first.
    pub fn top_n(&self, n: usize) -> Vec<(i64, i64)> {
        self.iter_best_first()
            .take(n)
            .map(|level| (level.price(), level.total_qty()))
            .collect()
    }

    /// Sum of remaining quantity across every level.
    pub fn total_qty(&self) -> i64 {
        self.levels.values().map(|level| level.total_qty()).sum()
    }
}
