pub mod plan_repository;
pub mod postgres_plan_repository;
pub mod postgres_project_directory;
pub mod postgres_stripe_event_log_repository;
pub mod postgres_usage_repository;
pub mod project_directory;
pub mod stripe_event_log_repository;
pub mod usage_repository;

#[cfg(test)]
pub mod mock_db;
#[cfg(test)]
pub mod mock_stripe_event_log_repository;
