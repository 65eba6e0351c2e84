pub mod mpesa;
pub mod notifications;
