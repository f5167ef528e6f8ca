pub mod db;
pub mod job_store;
pub mod types;
