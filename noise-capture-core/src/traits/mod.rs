pub mod capture_provider;
pub mod clock;
pub mod measurement_listener;
