//! Status, help and label of a single form item, derived before painting.

use std::fmt;

/// The parts of a field schema an item falls back on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaText {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemProps {
    /// Validation in progress.
    pub loading: bool,
    pub invalid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub help: Option<String>,
    pub label: Option<String>,
    pub extra: Option<String>,
    pub schema: Option<SchemaText>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    #[default]
    None,
    Validating,
    Error,
    Warning,
}

impl ItemStatus {
    /// Name used by component libraries for the validate status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::None => "",
            ItemStatus::Validating => "validating",
            ItemStatus::Error => "error",
            ItemStatus::Warning => "warning",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Help content of an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemHelp<'a> {
    Explicit(&'a str),
    /// Errors first, then warnings. Displayed as `a ,b ,c`.
    Messages(Vec<&'a str>),
    Description(&'a str),
}

impl fmt::Display for ItemHelp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemHelp::Explicit(text) | ItemHelp::Description(text) => f.write_str(text),
            ItemHelp::Messages(messages) => {
                for (index, message) in messages.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ,")?;
                    }
                    f.write_str(message)?;
                }
                Ok(())
            }
        }
    }
}

pub fn compute_status(props: &ItemProps) -> ItemStatus {
    if props.loading {
        ItemStatus::Validating
    } else if props.invalid {
        ItemStatus::Error
    } else if !props.warnings.is_empty() {
        ItemStatus::Warning
    } else {
        ItemStatus::None
    }
}

/// Set and non-empty.
fn present(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|text| !text.is_empty())
}

pub fn compute_help(props: &ItemProps) -> Option<ItemHelp<'_>> {
    if let Some(help) = present(&props.help) {
        return Some(ItemHelp::Explicit(help));
    }
    let messages: Vec<&str> = props
        .errors
        .iter()
        .chain(props.warnings.iter())
        .map(String::as_str)
        .collect();
    if !messages.is_empty() {
        return Some(ItemHelp::Messages(messages));
    }
    props
        .schema
        .as_ref()
        .and_then(|schema| present(&schema.description))
        .map(ItemHelp::Description)
}

pub fn compute_label(props: &ItemProps) -> Option<&str> {
    present(&props.label).or_else(|| {
        props
            .schema
            .as_ref()
            .and_then(|schema| present(&schema.title))
    })
}

pub fn compute_extra(props: &ItemProps) -> Option<&str> {
    present(&props.extra)
}

#[cfg(test)]
#[path = "tests/item_tests.rs"]
mod tests;
