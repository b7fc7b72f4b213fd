pub mod readiness;
pub mod uds_client;
pub mod unix_connector;
