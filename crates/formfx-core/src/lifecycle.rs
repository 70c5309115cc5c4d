use std::fmt;
use std::str::FromStr;

use crate::error::ParseLifeCycleError;

/// Lifecycle tag carried by every event a form publishes.
///
/// Built-in tags map to the `onForm*` / `onField*` names used by form
/// engines. `Custom` covers user-defined actions sent through
/// [`crate::Dispatch`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifeCycleType {
    FormWillInit,
    FormInit,
    FormChange,
    FormInputChange,
    FormInitialValuesChange,
    FormValuesChange,
    FormMount,
    FormUnmount,
    FormSubmit,
    FormSubmitStart,
    FormSubmitEnd,
    FormReset,
    FormValidateStart,
    FormValidateEnd,
    FieldWillInit,
    FieldInit,
    FieldChange,
    FieldInputChange,
    FieldValueChange,
    FieldInitialValueChange,
    FieldValidate,
    FieldMount,
    FieldUnmount,
    FieldAdded,
    FieldRemoved,
    Custom(String),
}

static BUILTIN: [LifeCycleType; 25] = [
    LifeCycleType::FormWillInit,
    LifeCycleType::FormInit,
    LifeCycleType::FormChange,
    LifeCycleType::FormInputChange,
    LifeCycleType::FormInitialValuesChange,
    LifeCycleType::FormValuesChange,
    LifeCycleType::FormMount,
    LifeCycleType::FormUnmount,
    LifeCycleType::FormSubmit,
    LifeCycleType::FormSubmitStart,
    LifeCycleType::FormSubmitEnd,
    LifeCycleType::FormReset,
    LifeCycleType::FormValidateStart,
    LifeCycleType::FormValidateEnd,
    LifeCycleType::FieldWillInit,
    LifeCycleType::FieldInit,
    LifeCycleType::FieldChange,
    LifeCycleType::FieldInputChange,
    LifeCycleType::FieldValueChange,
    LifeCycleType::FieldInitialValueChange,
    LifeCycleType::FieldValidate,
    LifeCycleType::FieldMount,
    LifeCycleType::FieldUnmount,
    LifeCycleType::FieldAdded,
    LifeCycleType::FieldRemoved,
];

impl LifeCycleType {
    pub fn custom(name: impl Into<String>) -> Self {
        LifeCycleType::Custom(name.into())
    }

    /// All built-in tags, in declaration order.
    pub fn builtin() -> &'static [LifeCycleType] {
        &BUILTIN
    }

    pub fn as_str(&self) -> &str {
        match self {
            LifeCycleType::FormWillInit => "onFormWillInit",
            LifeCycleType::FormInit => "onFormInit",
            LifeCycleType::FormChange => "onFormChange",
            LifeCycleType::FormInputChange => "onFormInputChange",
            LifeCycleType::FormInitialValuesChange => "onFormInitialValuesChange",
            LifeCycleType::FormValuesChange => "onFormValuesChange",
            LifeCycleType::FormMount => "onFormMount",
            LifeCycleType::FormUnmount => "onFormUnmount",
            LifeCycleType::FormSubmit => "onFormSubmit",
            LifeCycleType::FormSubmitStart => "onFormSubmitStart",
            LifeCycleType::FormSubmitEnd => "onFormSubmitEnd",
            LifeCycleType::FormReset => "onFormReset",
            LifeCycleType::FormValidateStart => "onFormValidateStart",
            LifeCycleType::FormValidateEnd => "onFormValidateEnd",
            LifeCycleType::FieldWillInit => "onFieldWillInit",
            LifeCycleType::FieldInit => "onFieldInit",
            LifeCycleType::FieldChange => "onFieldChange",
            LifeCycleType::FieldInputChange => "onFieldInputChange",
            LifeCycleType::FieldValueChange => "onFieldValueChange",
            LifeCycleType::FieldInitialValueChange => "onFieldInitialValueChange",
            LifeCycleType::FieldValidate => "onFieldValidate",
            LifeCycleType::FieldMount => "onFieldMount",
            LifeCycleType::FieldUnmount => "onFieldUnmount",
            LifeCycleType::FieldAdded => "onFieldAdded",
            LifeCycleType::FieldRemoved => "onFieldRemoved",
            LifeCycleType::Custom(name) => name.as_str(),
        }
    }

    pub fn is_form(&self) -> bool {
        self.as_str().starts_with("onForm")
    }

    pub fn is_field(&self) -> bool {
        self.as_str().starts_with("onField")
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, LifeCycleType::Custom(_))
    }
}

impl fmt::Display for LifeCycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a built-in `on*` name. Anything else is treated as a custom
/// action name; only the empty string is rejected.
impl FromStr for LifeCycleType {
    type Err = ParseLifeCycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseLifeCycleError::Empty);
        }
        if let Some(kind) = BUILTIN.iter().find(|kind| kind.as_str() == s) {
            return Ok(kind.clone());
        }
        if s.starts_with("onForm") || s.starts_with("onField") {
            return Err(ParseLifeCycleError::UnknownBuiltin(s.to_owned()));
        }
        Ok(LifeCycleType::Custom(s.to_owned()))
    }
}
