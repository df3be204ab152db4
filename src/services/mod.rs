pub mod contact_tracing;
pub mod customers;
pub mod deliveries;
pub mod visits;

pub use contact_tracing::ContactTracingService;
pub use customers::CustomerService;
pub use deliveries::HomeDeliveryService;
pub use visits::StoreVisitService;
