//! Ingredient stock domain module (event-sourced).
//!
//! A stock item is a catalog entry for something the business buys: its unit,
//! its budget category, and the quantity on hand at the buyer's premises.

pub mod item;

pub use item::{
    AdjustStock, ItemRegistered, ReceiveStock, RegisterItem, StockAdjusted, StockCommand,
    StockEvent, StockItem, StockItemId, StockReceived,
};
