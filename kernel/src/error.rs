use thiserror::Error;

/// The main error type for the `fibre_kernel` library.
///
/// Resolution errors carry the requested contract (by type name) and the
/// requested name so that callers can tell which request failed without
/// having to re-trace the call.
#[derive(Debug, Error)]
pub enum Error {
  #[error("A component named '{name}' is already registered")]
  DuplicateName { name: String },

  #[error("No component for service '{contract}'{} was found", fmt_name(.name))]
  ComponentNotFound {
    contract: String,
    name: Option<String>,
  },

  #[error(
    "Service '{contract}'{} is ambiguous, candidates: [{}]",
    fmt_name(.name),
    .candidates.join(", ")
  )]
  AmbiguousComponent {
    contract: String,
    name: Option<String>,
    candidates: Vec<String>,
  },

  #[error(
    "Delegate factory ({contract}) was unable to uniquely nominate component to resolve for service name '{}', candidates: [{}]. Register a custom selector to disambiguate",
    .name.as_deref().unwrap_or(""),
    .candidates.join(", ")
  )]
  NoUniqueComponent {
    contract: String,
    name: Option<String>,
    candidates: Vec<String>,
  },

  #[error("Circular dependency detected while resolving '{contract}': {}", .path.join(" -> "))]
  CircularDependency { contract: String, path: Vec<String> },

  #[error("Invalid naming key '{key}': {reason}")]
  InvalidNamingKey { key: String, reason: String },

  #[error("Component '{component}' is scoped and no scope is active")]
  NoActiveScope { component: String },

  #[error("Activation of component '{component}' failed: {message}")]
  Activation { component: String, message: String },

  #[error("The kernel owning this handle has been disposed")]
  KernelDisposed,

  #[error("Failed to read configuration file: {0}")]
  ConfigRead(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  ConfigParse(String),
}

fn fmt_name(name: &Option<String>) -> String {
  match name {
    Some(n) => format!(" with name '{}'", n),
    None => String::new(),
  }
}

impl Error {
  /// True for both flavors of ambiguity, including the delegate factory's
  /// `NoUniqueComponent`.
  pub fn is_ambiguous(&self) -> bool {
    matches!(
      self,
      Error::AmbiguousComponent { .. } | Error::NoUniqueComponent { .. }
    )
  }

  /// The colliding component names of an ambiguity error, empty otherwise.
  pub fn candidates(&self) -> &[String] {
    match self {
      Error::AmbiguousComponent { candidates, .. } | Error::NoUniqueComponent { candidates, .. } => {
        candidates
      }
      _ => &[],
    }
  }

  pub(crate) fn activation(component: &str, message: impl Into<String>) -> Self {
    Error::Activation {
      component: component.to_owned(),
      message: message.into(),
    }
  }
}

/// A specialized `Result` type for `fibre_kernel` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
