use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CrawlError;

const POSITION_PLACEHOLDER: &str = "{position}";

/// How to find elements on the page.
///
/// Serialized as a prefixed string (`css:...` or `xpath:...`) so selector
/// tables stay readable in `config.toml`. A locator may be a template holding
/// a `{position}` placeholder, filled with a 1-based index via [`Locator::at`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    pub fn expression(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }

    pub fn is_template(&self) -> bool {
        self.expression().contains(POSITION_PLACEHOLDER)
    }

    /// Fill the `{position}` placeholder with a 1-based position.
    pub fn at(&self, position: usize) -> Locator {
        let filled = self.expression().replace(POSITION_PLACEHOLDER, &position.to_string());
        match self {
            Locator::Css(_) => Locator::Css(filled),
            Locator::XPath(_) => Locator::XPath(filled),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = CrawlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(rest) = value.strip_prefix("css:") {
            Ok(Locator::Css(rest.trim().to_string()))
        } else if let Some(rest) = value.strip_prefix("xpath:") {
            Ok(Locator::XPath(rest.trim().to_string()))
        } else {
            Err(CrawlError::ConfigError(format!(
                "Locator '{}' must start with 'css:' or 'xpath:'",
                value
            )))
        }
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

/// Condition a bounded wait polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    Present,
    Visible,
    Clickable,
}

/// Keyboard chords the reply flow needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyChord {
    /// Submit.
    Enter,
    /// Line break inside a chat box without submitting.
    ShiftEnter,
}

/// Opaque identifier of a browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub String);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
