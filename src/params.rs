//! User-defined form fields injected into the portal pages.
//!
//! Callers register [`CustomParameter`]s before the portal starts; the save
//! handler absorbs submitted values back into the registry, truncating to
//! each field's declared capacity. Reading the values back out after the
//! portal resolves is the caller's job (typically to persist them).

use log::warn;

use crate::config::ConfigError;

/// Where the field label is rendered relative to its input element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPlacement {
    /// Label above the input (default).
    #[default]
    Before,
    /// Label below the input.
    After,
    /// No label at all.
    None,
}

/// One user-defined form field.
///
/// The value buffer is owned by the parameter and never grows beyond
/// `capacity` bytes; submissions that exceed it are truncated on a char
/// boundary. A parameter constructed by [`CustomParameter::markup_only`]
/// carries no input field, only raw markup.
#[derive(Debug, Clone)]
pub struct CustomParameter {
    id: String,
    placeholder: String,
    value: String,
    capacity: usize,
    markup: String,
    placement: LabelPlacement,
}

impl CustomParameter {
    /// Create a field with an alphanumeric `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameterId`] when `id` is empty or
    /// contains anything besides ASCII alphanumerics.
    pub fn new(
        id: impl Into<String>,
        placeholder: impl Into<String>,
        initial_value: &str,
        capacity: usize,
    ) -> Result<Self, ConfigError> {
        Self::with_markup(
            id,
            placeholder,
            initial_value,
            capacity,
            "",
            LabelPlacement::Before,
        )
    }

    /// Create a field with auxiliary markup and explicit label placement.
    ///
    /// # Errors
    ///
    /// Same id rules as [`CustomParameter::new`].
    pub fn with_markup(
        id: impl Into<String>,
        placeholder: impl Into<String>,
        initial_value: &str,
        capacity: usize,
        markup: impl Into<String>,
        placement: LabelPlacement,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        if !is_valid_id(&id) {
            return Err(ConfigError::InvalidParameterId { id });
        }
        let mut param = Self {
            id,
            placeholder: placeholder.into(),
            value: String::new(),
            capacity,
            markup: markup.into(),
            placement,
        };
        param.set_value(initial_value);
        Ok(param)
    }

    /// Raw markup injected into the form without any input field.
    pub fn markup_only(markup: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            placeholder: String::new(),
            value: String::new(),
            capacity: 0,
            markup: markup.into(),
            placement: LabelPlacement::None,
        }
    }

    /// Field id; empty for markup-only parameters.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Label/placeholder text.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Current value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Declared capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Auxiliary markup (extra attributes or raw HTML).
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Label placement for rendering.
    pub fn placement(&self) -> LabelPlacement {
        self.placement
    }

    /// True when this parameter renders an input field.
    pub fn is_field(&self) -> bool {
        !self.id.is_empty()
    }

    /// Store a submitted value, truncating to capacity on a char boundary.
    /// Returns whether truncation happened.
    pub fn set_value(&mut self, value: &str) -> bool {
        if value.len() <= self.capacity {
            self.value.clear();
            self.value.push_str(value);
            false
        } else {
            let mut end = self.capacity;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            self.value.clear();
            self.value.push_str(&value[..end]);
            true
        }
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Insertion-ordered collection of custom parameters.
///
/// Backed by a `Vec`, which already amortizes growth. Ids are not checked
/// for uniqueness; lookups return the first match.
#[derive(Debug, Default)]
pub struct ParameterRegistry {
    params: Vec<CustomParameter>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter. Order of registration is the render order.
    pub fn add(&mut self, param: CustomParameter) {
        self.params.push(param);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CustomParameter> {
        self.params.iter()
    }

    /// First parameter with the given id.
    pub fn get(&self, id: &str) -> Option<&CustomParameter> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Value of the first parameter with the given id.
    pub fn value(&self, id: &str) -> Option<&str> {
        self.get(id).map(CustomParameter::value)
    }

    /// Absorb submitted `(name, value)` pairs into matching fields.
    /// Returns how many fields were updated; truncations are logged.
    pub fn absorb(&mut self, values: &[(String, String)]) -> usize {
        let mut updated = 0;
        for param in self.params.iter_mut().filter(|p| p.is_field()) {
            if let Some((_, value)) = values.iter().find(|(name, _)| *name == param.id) {
                if param.set_value(value) {
                    warn!(
                        "parameter '{}' truncated to {} bytes",
                        param.id, param.capacity
                    );
                }
                updated += 1;
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Identifier Tests ====================

    #[test]
    fn test_alphanumeric_ids_accepted() {
        assert!(CustomParameter::new("mqtt1", "MQTT server", "", 40).is_ok());
        assert!(CustomParameter::new("Token", "API token", "", 16).is_ok());
    }

    #[test]
    fn test_invalid_ids_rejected_at_registration() {
        for id in ["", "bad id", "semi;colon", "under_score", "dash-ed"] {
            let result = CustomParameter::new(id, "x", "", 8);
            assert!(
                matches!(result, Err(ConfigError::InvalidParameterId { .. })),
                "id {id:?} should be rejected"
            );
        }
    }

    // ==================== Truncation Tests ====================

    #[test]
    fn test_value_truncated_to_capacity() {
        let mut param = CustomParameter::new("host", "Host", "", 5).unwrap();
        assert!(param.set_value("abcdefgh"));
        assert_eq!(param.value(), "abcde");
        assert!(param.value().len() <= param.capacity());
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut param = CustomParameter::new("name", "Name", "", 5).unwrap();
        // Each 'é' is two bytes; byte 5 would split one in half.
        assert!(param.set_value("ééé"));
        assert_eq!(param.value(), "éé");
    }

    #[test]
    fn test_initial_value_also_truncated() {
        let param = CustomParameter::new("key", "Key", "0123456789", 4).unwrap();
        assert_eq!(param.value(), "0123");
    }

    // ==================== Registry Tests ====================

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = ParameterRegistry::new();
        registry.add(CustomParameter::new("b", "B", "", 4).unwrap());
        registry.add(CustomParameter::new("a", "A", "", 4).unwrap());
        let ids: Vec<&str> = registry.iter().map(CustomParameter::id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_absorb_updates_matching_fields() {
        let mut registry = ParameterRegistry::new();
        registry.add(CustomParameter::new("srv", "Server", "", 32).unwrap());
        registry.add(CustomParameter::new("port", "Port", "1883", 5).unwrap());
        registry.add(CustomParameter::markup_only("<hr/>"));

        let submitted = vec![
            ("srv".to_string(), "mqtt.local".to_string()),
            ("unrelated".to_string(), "x".to_string()),
        ];
        assert_eq!(registry.absorb(&submitted), 1);
        assert_eq!(registry.value("srv"), Some("mqtt.local"));
        assert_eq!(registry.value("port"), Some("1883"));
    }

    #[test]
    fn test_markup_only_is_not_a_field() {
        let param = CustomParameter::markup_only("<p>note</p>");
        assert!(!param.is_field());
        assert_eq!(param.markup(), "<p>note</p>");
    }
}
