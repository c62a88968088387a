mod config;
pub(crate) mod subscriber;
mod topic;

pub use config::MqttIngesterConfig;
pub use subscriber::{handle_mqtt_message, run_mqtt_subscriber};
pub use topic::{device_id_from_topic, TopicError};
