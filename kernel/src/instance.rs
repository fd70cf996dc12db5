//! Type-erased component instances and inline resolution arguments.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A resolved component with its concrete type erased.
///
/// The wrapped value is the `Arc<I>` produced by the component's factory. The
/// address of the pointee identifies the instance for `release`, and stays the
/// same when the `Arc` is coerced to any of the component's trait contracts.
#[derive(Clone)]
pub struct Instance {
  object: Arc<dyn Any + Send + Sync>,
  address: usize,
}

impl Instance {
  pub fn new<I: ?Sized + Any + Send + Sync>(value: Arc<I>) -> Self {
    let address = address_of(&value);
    Self {
      object: Arc::new(value),
      address,
    }
  }

  /// Recovers the factory's `Arc<I>`.
  pub fn downcast<I: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<I>> {
    self.object.downcast_ref::<Arc<I>>().cloned()
  }

  pub fn address(&self) -> usize {
    self.address
  }
}

impl fmt::Debug for Instance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Instance({:#x})", self.address)
  }
}

pub(crate) fn address_of<T: ?Sized>(value: &Arc<T>) -> usize {
  Arc::as_ptr(value) as *const () as usize
}

/// Ordered, type-keyed values handed to a factory at activation time.
///
/// Lookups return the first value of the requested type.
#[derive(Clone, Default)]
pub struct Arguments {
  values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl Arguments {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
    self.values.push(Arc::new(value));
    self
  }

  pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
    self.values.push(Arc::new(value));
  }

  pub fn get<T: Any>(&self) -> Option<&T> {
    self.values.iter().find_map(|v| v.downcast_ref::<T>())
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl fmt::Debug for Arguments {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Arguments(len = {})", self.values.len())
  }
}
