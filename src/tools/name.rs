//! Namespaced tool identifiers: `<namespace>__<scope>__<tool>`.

use std::fmt;

use super::error::RoutingError;

/// Segment delimiter in qualified tool names.
pub const DELIMITER: &str = "__";

/// Which side of the router a tool lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Local,
    Remote,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolName {
    pub namespace: Namespace,
    pub scope: String,
    /// Everything after the scope; may itself contain `__`.
    pub local: String,
}

impl ToolName {
    /// Parse a qualified name.
    ///
    /// # Errors
    ///
    /// [`RoutingError::MalformedName`] for fewer than three non-empty
    /// segments, [`RoutingError::UnknownNamespace`] for anything other than
    /// `local` or `remote`.
    pub fn parse(name: &str) -> Result<Self, RoutingError> {
        let malformed = || RoutingError::MalformedName {
            name: name.to_owned(),
        };

        let mut parts = name.splitn(3, DELIMITER);
        let namespace = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let scope = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
        let local = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;

        let namespace = match namespace {
            "local" => Namespace::Local,
            "remote" => Namespace::Remote,
            other => {
                return Err(RoutingError::UnknownNamespace {
                    namespace: other.to_owned(),
                    name: name.to_owned(),
                });
            }
        };

        Ok(Self {
            namespace,
            scope: scope.to_owned(),
            local: local.to_owned(),
        })
    }

    /// Build a qualified name string.
    pub fn qualified(namespace: Namespace, scope: &str, local: &str) -> String {
        format!("{namespace}{DELIMITER}{scope}{DELIMITER}{local}")
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{DELIMITER}{}{DELIMITER}{}",
            self.namespace, self.scope, self.local
        )
    }
}
