//! Plain data types shared by the storage layer and the services.
//!
//! Nothing here performs I/O. Status enums round-trip through the
//! snake_case strings stored in the database.

/// Generates `as_str`, `Display` and `FromStr` for a fieldless enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stored string form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::model::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

mod address;
mod cart;
mod catalog;
mod order;
mod payment;
mod promotion;

pub use address::{Address, NewAddress};
pub use cart::{Cart, CartItem, CartStatus, CartType, EmailedCart};
pub use catalog::{Product, ProductStatus, ProductVariant};
pub use order::{AppliedPromotion, Order, OrderItem, OrderStatus, PaymentStatus, Totals};
pub use payment::{PaymentTransaction, TransactionSource};
pub use promotion::{DiscountType, ProductBundle, Promotion};

/// Free-form annotations attached to carts and orders.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Error returned when a stored status string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
