//! Typed item properties.
//!
//! Repository items carry a schema of properties of a closed set of kinds.
//! Newly created items get their descriptor and required properties filled
//! in through [`ItemProperty::initialize`].

use serde::{Deserialize, Serialize};

/// One option of an enumerated property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumOption {
    pub code: u32,
    pub label: String,
    pub enabled: bool,
}

/// Value of a property, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyValue {
    Text { value: String, max_len: usize },
    Integer { value: i32, max: i32 },
    Long { value: i64, max: i64 },
    Boolean { value: bool },
    Enumerated { selected: Option<u32>, options: Vec<EnumOption> },
}

/// A named property slot on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProperty {
    pub name: String,
    pub value: PropertyValue,
    #[serde(default)]
    pub descriptor: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub calculated: bool,
}

impl ItemProperty {
    /// Fill a freshly created item's property. An empty text descriptor
    /// takes the item name; every other kind is stepped once.
    pub fn initialize(&mut self, item_name: &str) {
        if let PropertyValue::Text { value, max_len } = &mut self.value {
            if value.is_empty() {
                *value = truncate_chars(item_name, *max_len);
                return;
            }
        }
        self.perturb();
    }

    /// Move the value to a different valid value of the same kind.
    pub fn perturb(&mut self) {
        match &mut self.value {
            PropertyValue::Text { value, max_len } => {
                let keep = max_len.saturating_sub(1);
                *value = truncate_chars(value, keep);
                value.push('!');
            }
            PropertyValue::Integer { value, max } => {
                if *value < *max {
                    *value += 1;
                } else if *value > *max {
                    *value -= 1;
                }
            }
            PropertyValue::Long { value, max } => {
                if *value < *max {
                    *value += 1;
                } else if *value > *max {
                    *value -= 1;
                }
            }
            PropertyValue::Boolean { value } => *value = !*value,
            PropertyValue::Enumerated { selected, options } => {
                let current = *selected;
                if let Some(next) = options
                    .iter()
                    .find(|o| o.enabled && Some(o.code) != current)
                {
                    *selected = Some(next.code);
                }
            }
        }
    }

    fn needs_initial_value(&self) -> bool {
        !self.calculated && (self.descriptor || self.required)
    }
}

/// Initialize every descriptor or required, non-calculated property of a
/// new item. Returns the names of the properties that were touched.
pub fn init_properties(properties: &mut [ItemProperty], item_name: &str) -> Vec<String> {
    properties
        .iter_mut()
        .filter(|p| p.needs_initial_value())
        .map(|p| {
            p.initialize(item_name);
            p.name.clone()
        })
        .collect()
}

/// Property schema given to every file created by the bundled repository.
pub fn default_file_properties() -> Vec<ItemProperty> {
    vec![
        ItemProperty {
            name: "Description".into(),
            value: PropertyValue::Text {
                value: String::new(),
                max_len: 254,
            },
            descriptor: true,
            required: false,
            calculated: false,
        },
        ItemProperty {
            name: "Archived".into(),
            value: PropertyValue::Boolean { value: true },
            descriptor: false,
            required: false,
            calculated: false,
        },
        ItemProperty {
            name: "Size".into(),
            value: PropertyValue::Long { value: 0, max: i64::MAX },
            descriptor: false,
            required: true,
            calculated: true,
        },
    ]
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(value: PropertyValue) -> ItemProperty {
        ItemProperty {
            name: "p".into(),
            value,
            descriptor: true,
            required: false,
            calculated: false,
        }
    }

    #[test]
    fn test_empty_text_descriptor_takes_truncated_name() {
        let mut p = prop(PropertyValue::Text {
            value: String::new(),
            max_len: 4,
        });
        p.initialize("readme.txt");
        assert_eq!(
            p.value,
            PropertyValue::Text {
                value: "read".into(),
                max_len: 4
            }
        );
    }

    #[test]
    fn test_non_empty_text_is_perturbed_within_limit() {
        let mut p = prop(PropertyValue::Text {
            value: "abcd".into(),
            max_len: 4,
        });
        p.initialize("ignored");
        assert_eq!(
            p.value,
            PropertyValue::Text {
                value: "abc!".into(),
                max_len: 4
            }
        );
    }

    #[test]
    fn test_numeric_values_step_toward_max() {
        let mut below = prop(PropertyValue::Integer { value: 1, max: 5 });
        below.perturb();
        assert_eq!(below.value, PropertyValue::Integer { value: 2, max: 5 });

        let mut above = prop(PropertyValue::Long { value: 9, max: 5 });
        above.perturb();
        assert_eq!(above.value, PropertyValue::Long { value: 8, max: 5 });

        let mut at_max = prop(PropertyValue::Integer { value: 5, max: 5 });
        at_max.perturb();
        assert_eq!(at_max.value, PropertyValue::Integer { value: 5, max: 5 });
    }

    #[test]
    fn test_boolean_flips_and_enum_picks_other_enabled_option() {
        let mut b = prop(PropertyValue::Boolean { value: false });
        b.perturb();
        assert_eq!(b.value, PropertyValue::Boolean { value: true });

        let options = vec![
            EnumOption { code: 1, label: "low".into(), enabled: true },
            EnumOption { code: 2, label: "mid".into(), enabled: false },
            EnumOption { code: 3, label: "high".into(), enabled: true },
        ];
        let mut e = prop(PropertyValue::Enumerated {
            selected: Some(1),
            options,
        });
        e.perturb();
        assert!(matches!(e.value, PropertyValue::Enumerated { selected: Some(3), .. }));
    }

    #[test]
    fn test_init_properties_skips_calculated_and_plain() {
        let mut props = default_file_properties();
        let touched = init_properties(&mut props, "main.rs");
        assert_eq!(touched, vec!["Description".to_string()]);
        assert_eq!(
            props[0].value,
            PropertyValue::Text {
                value: "main.rs".into(),
                max_len: 254
            }
        );
        assert_eq!(props[1].value, PropertyValue::Boolean { value: true });
    }
}
