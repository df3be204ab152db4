//! Customer-side entities. Accounts live under [`crate::auth::user`].

pub mod customer;
pub mod employee;
pub mod home_delivery_order;
pub mod session;
pub mod store_visit;
