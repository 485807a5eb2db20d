//! Protocol module
//!
//! Turtle wire items as a closed sum type. The service dispatches on
//! `TurtleItem` exhaustively; adding an item kind means handling it there.

mod items;

pub use items::{
    SearchRequestItem, SearchResultItem, TunnelDataItem, TunnelDirection, TunnelRequestItem,
    TunnelResultItem, TurtleItem, ITEM_HEADER_SIZE,
};
