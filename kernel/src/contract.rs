//! Service contracts: the runtime identity of the types components are
//! registered under and resolved as.

use crate::delegate::DelegateBinding;
use crate::instance::Instance;

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifies a service contract.
///
/// Two contracts are equal when they describe the same Rust type. A contract
/// may additionally carry a [`Callable`] shape, which is how the kernel
/// recognizes delegate contracts without any type introspection.
#[derive(Clone)]
pub struct Contract {
  id: TypeId,
  type_name: &'static str,
  callable: Option<Arc<Callable>>,
}

/// The shape of a callable contract: what it returns and how to bind a
/// callable value of that type to the kernel.
pub struct Callable {
  returns: Contract,
  pub(crate) bind: fn(DelegateBinding) -> Instance,
  pub(crate) project: fn(&Instance) -> Option<Box<dyn Any + Send + Sync>>,
}

// Marker for the universal contract every handler is assignable to.
struct AnyService;

impl Contract {
  /// The contract for `T`, which may be a trait object such as `dyn Greeter`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      type_name: type_name::<T>(),
      callable: None,
    }
  }

  /// The universal contract. Every registered handler is assignable to it.
  pub fn any() -> Self {
    Self {
      id: TypeId::of::<AnyService>(),
      type_name: "any",
      callable: None,
    }
  }

  pub(crate) fn with_callable<T: ?Sized + Any>(callable: Callable) -> Self {
    Self {
      id: TypeId::of::<T>(),
      type_name: type_name::<T>(),
      callable: Some(Arc::new(callable)),
    }
  }

  pub fn is_any(&self) -> bool {
    self.id == TypeId::of::<AnyService>()
  }

  pub fn type_id(&self) -> TypeId {
    self.id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  /// The callable shape, if this contract was built as a delegate contract.
  pub fn callable(&self) -> Option<&Callable> {
    self.callable.as_deref()
  }

  /// Whether a component registered under `service` can satisfy a request
  /// for `self`.
  pub fn is_assignable_from(&self, service: &Contract) -> bool {
    self.is_any() || self == service
  }
}

impl Callable {
  pub(crate) fn new(
    returns: Contract,
    bind: fn(DelegateBinding) -> Instance,
    project: fn(&Instance) -> Option<Box<dyn Any + Send + Sync>>,
  ) -> Self {
    Self { returns, bind, project }
  }

  pub fn returns(&self) -> &Contract {
    &self.returns
  }

  /// False when the callable returns `()`.
  pub fn has_return(&self) -> bool {
    self.returns.id != TypeId::of::<()>()
  }
}

impl PartialEq for Contract {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl Eq for Contract {}

impl Hash for Contract {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl fmt::Debug for Contract {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.callable {
      Some(callable) => write!(f, "Contract({} -> {})", self.type_name, callable.returns.type_name),
      None => write!(f, "Contract({})", self.type_name),
    }
  }
}

impl fmt::Display for Contract {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.type_name)
  }
}
