pub mod branch;
pub mod distribution;
pub mod log_activity;
pub mod material;
pub mod request;
pub mod request_code_sequence;
pub mod request_item;
pub mod school;
pub mod stock;
pub mod user;
