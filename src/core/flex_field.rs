/// Placeholders for the flex fields of an export object.
///
/// Every resolver works under a prefix, so a template can address several
/// objects at once (`Tale_Condition_Npc_Name` next to
/// `Tale_Condition_Item_Name`).
use crate::core::config::ExportSettings;
use crate::core::diagnostics::{ErrorCollection, ExportErrorKind};
use crate::core::placeholder;
use crate::core::template::TemplatePlaceholder;
use crate::schema::object::{ExportObject, FlexFieldValue};

/// Formats whole numbers without a fraction.
pub(crate) fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct FlexFieldResolver {
    prefix: String,
}

impl FlexFieldResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Fill every placeholder of this prefix with data from `object`.
    ///
    /// A value placeholder for a field the object lacks records a
    /// `MissingFlexField` diagnostic and renders as empty text.
    pub fn fill(
        &self,
        code: &str,
        object: &ExportObject,
        settings: &ExportSettings,
        errors: &mut ErrorCollection,
    ) -> String {
        let code = placeholder::replace(code, &self.name("Id"), &object.id);
        let code = placeholder::replace_with(&code, &self.name("Name"), || {
            settings.escape(&object.name)
        });
        let code = placeholder::render_if_captured(
            &code,
            &self.name("HasField_(.*)_Start"),
            &self.name("HasField_(.*)_End"),
            |field| object.field(field).is_some(),
        );
        let code = placeholder::render_if_captured(
            &code,
            &self.name("NotHasField_(.*)_Start"),
            &self.name("NotHasField_(.*)_End"),
            |field| object.field(field).is_none(),
        );
        placeholder::replace_captured(&code, &self.name("Value_(.*)"), |field| {
            match object.field(field) {
                Some(found) => match &found.value {
                    FlexFieldValue::Number(number) => format_number(*number),
                    FlexFieldValue::Text(text) | FlexFieldValue::Option(text) => {
                        settings.escape(text)
                    }
                },
                None => {
                    errors.add(
                        ExportErrorKind::MissingFlexField,
                        format!("'{}' has no field '{}'", object.name, field),
                    );
                    String::new()
                }
            }
        })
    }

    pub fn placeholders(&self) -> Vec<TemplatePlaceholder> {
        vec![
            TemplatePlaceholder::new(self.name("Id"), "Id of the object"),
            TemplatePlaceholder::new(self.name("Name"), "Name of the object"),
            TemplatePlaceholder::new(
                self.name("Value_<Field Name>"),
                "Value of the flex field <Field Name>",
            ),
            TemplatePlaceholder::new(
                self.name("HasField_<Field Name>_Start"),
                "Start of content rendered only if the object has the field <Field Name>",
            ),
            TemplatePlaceholder::new(
                self.name("HasField_<Field Name>_End"),
                "End of content rendered only if the object has the field <Field Name>",
            ),
            TemplatePlaceholder::new(
                self.name("NotHasField_<Field Name>_Start"),
                "Start of content rendered only if the object lacks the field <Field Name>",
            ),
            TemplatePlaceholder::new(
                self.name("NotHasField_<Field Name>_End"),
                "End of content rendered only if the object lacks the field <Field Name>",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ExportObject {
        ExportObject::new("npc-7", "Guard \"Bob\"")
            .with_field("Health", FlexFieldValue::Number(100.0))
            .with_field("Mood", FlexFieldValue::Option("Grumpy".to_string()))
            .with_field("Speed", FlexFieldValue::Number(1.5))
    }

    #[test]
    fn fills_id_name_and_values() {
        let mut errors = ErrorCollection::new();
        let code = FlexFieldResolver::new("Tale_Npc").fill(
            "{{Tale_Npc_Id}} {{Tale_Npc_Name}} {{Tale_Npc_Value_health}} {{Tale_Npc_Value_Speed}} {{Tale_Npc_Value_Mood}}",
            &guard(),
            &ExportSettings::default(),
            &mut errors,
        );
        assert_eq!(code, "npc-7 Guard \\\"Bob\\\" 100 1.5 Grumpy");
        assert!(errors.is_empty());
    }

    #[test]
    fn field_blocks() {
        let mut errors = ErrorCollection::new();
        let code = FlexFieldResolver::new("P").fill(
            "{{P_HasField_Mood_Start}}mood{{P_HasField_Mood_End}}|{{P_HasField_Gold_Start}}gold{{P_HasField_Gold_End}}|{{P_NotHasField_Gold_Start}}poor{{P_NotHasField_Gold_End}}",
            &guard(),
            &ExportSettings::default(),
            &mut errors,
        );
        assert_eq!(code, "mood||poor");
    }

    #[test]
    fn missing_value_is_reported() {
        let mut errors = ErrorCollection::new();
        let code = FlexFieldResolver::new("P").fill(
            "gold = {{P_Value_Gold}}",
            &guard(),
            &ExportSettings::default(),
            &mut errors,
        );
        assert_eq!(code, "gold = ");
        assert_eq!(errors.count_of(ExportErrorKind::MissingFlexField), 1);
    }

    #[test]
    fn other_prefixes_are_untouched() {
        let mut errors = ErrorCollection::new();
        let code = FlexFieldResolver::new("Tale_Npc").fill(
            "{{Tale_Item_Name}}",
            &guard(),
            &ExportSettings::default(),
            &mut errors,
        );
        assert_eq!(code, "{{Tale_Item_Name}}");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.25), "0.25");
    }
}
