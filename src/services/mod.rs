// Ledger and audit primitives, shared by the services below
pub mod activity_log;
pub mod request_code;
pub mod stock_ledger;

// Directory lookups and integrity-guarded maintenance
pub mod directory;

// Core services
pub mod distributions;
pub mod requests;
pub mod stocks;
