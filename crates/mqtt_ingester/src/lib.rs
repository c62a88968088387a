pub mod mqtt;
pub mod mqtt_ingester;

pub use mqtt::*;
pub use mqtt_ingester::*;
