//! Motor controller settings document

use serde_yaml::{Mapping, Value};

use super::MotorError;

/// Settings key selecting the controller's feedback source.
pub const FEEDBACK_MODE_KEY: &str = "feedback_mode";

/// Feedback mode value for open-loop (no feedback) operation.
pub const OPEN_LOOP_FEEDBACK_MODE: &str = "disabled";

/// The controller's settings as read from the vendor CLI.
///
/// Kept as an ordered key/value document so keys this crate does not know about
/// survive a read/modify/write cycle unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotorSettings {
    document: Mapping,
}

impl MotorSettings {
    /// Parse a settings document. Anything other than a key/value mapping is rejected.
    pub fn from_yaml(text: &str) -> Result<Self, MotorError> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(document) => Ok(Self { document }),
            Value::Null => Err(MotorError::MalformedSettings(
                "settings document is empty".to_string(),
            )),
            other => Err(MotorError::MalformedSettings(format!(
                "expected a key/value document, got {other:?}"
            ))),
        }
    }

    pub fn to_yaml(&self) -> Result<String, MotorError> {
        Ok(serde_yaml::to_string(&self.document)?)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set a key, replacing any existing value in place.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.document.insert(Value::from(key), value.into());
    }

    pub fn len(&self) -> usize {
        self.document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Switch the controller to open-loop operation.
    pub fn force_open_loop(&mut self) {
        self.set(FEEDBACK_MODE_KEY, OPEN_LOOP_FEEDBACK_MODE);
    }

    pub fn is_open_loop(&self) -> bool {
        self.get_str(FEEDBACK_MODE_KEY) == Some(OPEN_LOOP_FEEDBACK_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Motor controller settings
product: jrk_g2_21v3
input_mode: serial
feedback_mode: analog
max_duty_cycle_forward: 600
max_duty_cycle_reverse: 600
";

    #[test]
    fn test_parse_and_query() {
        let settings = MotorSettings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.len(), 5);
        assert_eq!(settings.get_str("input_mode"), Some("serial"));
        assert_eq!(
            settings.get("max_duty_cycle_forward").and_then(Value::as_u64),
            Some(600)
        );
        assert!(!settings.is_open_loop());
    }

    #[test]
    fn test_force_open_loop_preserves_other_keys_and_order() {
        let mut settings = MotorSettings::from_yaml(SAMPLE).unwrap();
        settings.force_open_loop();
        assert!(settings.is_open_loop());
        assert_eq!(settings.len(), 5);

        let yaml = settings.to_yaml().unwrap();
        let keys: Vec<&str> = yaml
            .lines()
            .filter_map(|line| line.split(':').next())
            .collect();
        assert_eq!(
            keys,
            vec![
                "product",
                "input_mode",
                "feedback_mode",
                "max_duty_cycle_forward",
                "max_duty_cycle_reverse"
            ]
        );
        assert!(yaml.contains("feedback_mode: disabled"));
    }

    #[test]
    fn test_force_open_loop_adds_missing_key() {
        let mut settings = MotorSettings::from_yaml("product: jrk\n").unwrap();
        settings.force_open_loop();
        assert_eq!(settings.len(), 2);
        assert!(settings.is_open_loop());
    }

    #[test]
    fn test_rejects_non_mapping_documents() {
        assert!(matches!(
            MotorSettings::from_yaml("- a\n- b\n"),
            Err(MotorError::MalformedSettings(_))
        ));
        assert!(matches!(
            MotorSettings::from_yaml(""),
            Err(MotorError::MalformedSettings(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_yaml() {
        assert!(matches!(
            MotorSettings::from_yaml("key: [unterminated"),
            Err(MotorError::Yaml(_))
        ));
    }
}
