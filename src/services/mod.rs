pub mod locks;
pub mod plan_manager;
pub mod stripe;
pub mod usage_meter;
