use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopicError {
    #[error("topic '{0}' has no device segment")]
    MissingDeviceSegment(String),
}

/// Extract the device id from the last `/`-separated segment of a topic.
///
/// # Examples
/// ```
/// use mqtt_ingester::device_id_from_topic;
///
/// let device_id = device_id_from_topic("robo/lab/leituras/esp32-01").unwrap();
/// assert_eq!(device_id, "esp32-01");
/// ```
pub fn device_id_from_topic(topic: &str) -> Result<&str, TopicError> {
    let device_id = topic.rsplit('/').next().unwrap_or_default().trim();

    if device_id.is_empty() {
        return Err(TopicError::MissingDeviceSegment(topic.to_string()));
    }

    Ok(device_id)
}
