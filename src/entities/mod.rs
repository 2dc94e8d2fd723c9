pub mod address;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

// Re-export entities
pub use address::{Entity as Address, Model as AddressModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus, PaymentType};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use user::{Entity as User, Model as UserModel};
