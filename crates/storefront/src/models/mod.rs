//! Domain models for the storefront.
//!
//! Models mirror the database tables and deserialize straight from
//! persistence rows. Embedded relations (`product`, `category`, `items`)
//! are only present when the query asked for them.

mod address;
mod cart;
mod category;
mod order;
mod product;
mod review;
pub mod session;

pub use address::{Address, AddressPatch, NewAddress};
pub use cart::{Cart, CartItem, cart_subtotal};
pub use category::Category;
pub use order::{Order, OrderItem};
pub use product::Product;
pub use review::{NewReview, RatingSummary, Review, ReviewPatch};
pub use session::{CurrentUser, keys as session_keys};
