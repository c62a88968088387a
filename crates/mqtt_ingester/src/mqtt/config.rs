use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttIngesterConfig {
    pub broker: String,
    pub port: u16,

    /// Credentials are only sent when both are set and non-empty
    pub username: Option<String>,
    pub password: Option<String>,

    /// Subscription filter; the last segment of each matched topic is the device id
    pub topic: String,

    /// 0, 1 or 2
    pub qos: u8,

    pub client_id: String,
    pub keep_alive_secs: u64,

    /// Consecutive failed connection attempts before giving up (0 retries forever)
    pub max_retry_attempts: u32,

    /// Delay before reconnecting after a connection error
    pub retry_delay_secs: u64,
}

impl Default for MqttIngesterConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            topic: "robo/lab/leituras/#".to_string(),
            qos: 1,
            client_id: "robolab-ingester".to_string(),
            keep_alive_secs: 60,
            max_retry_attempts: 0,
            retry_delay_secs: 5,
        }
    }
}

impl MqttIngesterConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn subscription_qos(&self) -> anyhow::Result<QoS> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(anyhow::anyhow!("invalid MQTT QoS level: {}", other)),
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }

    /// Whether another connection attempt is allowed after `failures` consecutive failures
    pub fn should_retry(&self, failures: u32) -> bool {
        self.max_retry_attempts == 0 || failures < self.max_retry_attempts
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lab_firmware() {
        let config = MqttIngesterConfig::default();
        assert_eq!(config.topic, "robo/lab/leituras/#");
        assert_eq!(config.subscription_qos().unwrap(), QoS::AtLeastOnce);
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_qos_levels() {
        let mut config = MqttIngesterConfig::default();
        config.qos = 0;
        assert_eq!(config.subscription_qos().unwrap(), QoS::AtMostOnce);
        config.qos = 2;
        assert_eq!(config.subscription_qos().unwrap(), QoS::ExactlyOnce);
        config.qos = 3;
        assert!(config.subscription_qos().is_err());
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let mut config = MqttIngesterConfig {
            username: Some("lab".to_string()),
            ..Default::default()
        };
        assert!(config.credentials().is_none());

        config.password = Some("secret".to_string());
        assert_eq!(config.credentials(), Some(("lab", "secret")));
    }

    #[test]
    fn test_empty_credentials_are_unset() {
        let mut config = MqttIngesterConfig {
            username: Some(String::new()),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(config.credentials().is_none());

        config.username = Some("lab".to_string());
        config.password = Some(String::new());
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_retry_budget() {
        let unlimited = MqttIngesterConfig::default();
        assert!(unlimited.should_retry(10_000));

        let bounded = MqttIngesterConfig {
            max_retry_attempts: 3,
            ..Default::default()
        };
        assert!(bounded.should_retry(2));
        assert!(!bounded.should_retry(3));
    }
}
