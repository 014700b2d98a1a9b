//! Aggregates module
pub mod product;
pub mod order;
pub mod request;
pub mod warehouse;

pub use product::{Product, ProductError, ProductVariant};
pub use order::{Order, OrderError, OrderItem, OrderStatus, PaymentMethod, ShippingDetails, StatusPresentation, Tone, TransitionPolicy};
pub use request::{Decision, Request, RequestError, RequestStatus, RequestType};
pub use warehouse::{total_quantities, StockEntry, StockItem, StockItemVariant, Warehouse};
