//! Clients for services the coordinator talks to.

pub mod inventory;

pub use inventory::{
    InMemoryStockService, InventoryCall, InventoryError, ReservationAck, ReservationStream,
    StockReservationClient, StockReservationRequest, reservation_batch, restore_batch,
};
