//! Per-descriptor runtime state.

use crate::contract::Contract;
use crate::descriptor::{ComponentDescriptor, Lifestyle};
use crate::instance::Instance;
use crate::naming::NamingKey;
use crate::registry::ComponentRegistry;

use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Whether a handler's dependency requirements can currently be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
  Valid,
  WaitingDependency,
}

/// Runtime wrapper around exactly one [`ComponentDescriptor`].
///
/// A singleton handler owns its cached instance; the instance is torn down
/// when the handler is unregistered or the kernel is dropped, never by
/// `release`.
pub struct Handler {
  descriptor: ComponentDescriptor,
  naming_key: Option<NamingKey>,
  registry: Weak<ComponentRegistry>,
  pub(crate) singleton: OnceCell<Activation>,
  references: AtomicUsize,
  disposed: AtomicBool,
}

impl Handler {
  pub(crate) fn new(descriptor: ComponentDescriptor, registry: Weak<ComponentRegistry>) -> Self {
    // Synthetic names and names outside the compound grammar only answer
    // exact lookups.
    let naming_key = if descriptor.is_synthetic() {
      None
    } else {
      NamingKey::parse(descriptor.name()).ok()
    };
    Self {
      descriptor,
      naming_key,
      registry,
      singleton: OnceCell::new(),
      references: AtomicUsize::new(0),
      disposed: AtomicBool::new(false),
    }
  }

  pub fn name(&self) -> &str {
    self.descriptor.name()
  }

  pub fn descriptor(&self) -> &ComponentDescriptor {
    &self.descriptor
  }

  pub fn lifestyle(&self) -> Lifestyle {
    self.descriptor.lifestyle()
  }

  pub(crate) fn naming_key(&self) -> Option<&NamingKey> {
    self.naming_key.as_ref()
  }

  pub fn is_assignable_to(&self, contract: &Contract) -> bool {
    self.descriptor.provides(contract)
  }

  /// Evaluates the dependency requirements against the live registry.
  ///
  /// A handler whose registry is gone reports `WaitingDependency`.
  pub fn state(&self) -> HandlerState {
    match self.registry.upgrade() {
      Some(registry) => registry.read().state_of(self),
      None => HandlerState::WaitingDependency,
    }
  }

  /// True once a singleton instance has been created.
  pub fn is_activated(&self) -> bool {
    self.singleton.get().is_some()
  }

  /// Outstanding logical references to the cached singleton.
  pub fn references(&self) -> usize {
    self.references.load(Ordering::Acquire)
  }

  pub(crate) fn acquire(&self) {
    self.references.fetch_add(1, Ordering::AcqRel);
  }

  pub(crate) fn release_reference(&self) {
    let _ = self
      .references
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
  }

  pub(crate) fn singleton_address(&self) -> Option<usize> {
    self.singleton.get().map(|activation| activation.instance.address())
  }

  pub(crate) fn project(&self, instance: &Instance, contract: &Contract) -> Option<Box<dyn Any + Send + Sync>> {
    self.descriptor.project(instance, contract)
  }

  pub(crate) fn run_release_hook(&self, instance: &Instance) {
    if let Some(hook) = &self.descriptor.on_release {
      hook(instance);
    }
  }

  /// Tears down the cached singleton, at most once.
  pub(crate) fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    if let Some(activation) = self.singleton.get() {
      tracing::trace!(component = self.name(), "disposing singleton");
      self.run_release_hook(&activation.instance);
      activation.teardown_dependents();
    }
  }

  pub(crate) fn needs_tracking(&self) -> bool {
    self.descriptor.on_release.is_some()
  }
}

impl fmt::Debug for Handler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Handler")
      .field("name", &self.name())
      .field("lifestyle", &self.lifestyle())
      .field("activated", &self.is_activated())
      .finish()
  }
}

/// A created instance together with the transient dependencies it alone owns
/// and the singletons it holds a reference to.
pub(crate) struct Activation {
  pub(crate) instance: Instance,
  pub(crate) dependents: Vec<Burden>,
  pub(crate) shared: Vec<Arc<Handler>>,
}

impl Activation {
  pub(crate) fn teardown_dependents(&self) {
    teardown_all(&self.dependents, &self.shared);
  }
}

/// Tears down owned dependents in reverse and gives back singleton references.
pub(crate) fn teardown_all(dependents: &[Burden], shared: &[Arc<Handler>]) {
  for dependent in dependents.iter().rev() {
    dependent.teardown();
  }
  for handler in shared {
    handler.release_reference();
  }
}

/// An exclusively owned instance awaiting release.
pub(crate) struct Burden {
  pub(crate) handler: Arc<Handler>,
  pub(crate) activation: Activation,
}

impl Burden {
  pub(crate) fn address(&self) -> usize {
    self.activation.instance.address()
  }

  /// Whether releasing this instance has any observable effect: a release
  /// hook or a singleton reference to give back.
  pub(crate) fn needs_tracking(&self) -> bool {
    self.handler.needs_tracking()
      || !self.activation.shared.is_empty()
      || self.activation.dependents.iter().any(Burden::needs_tracking)
  }

  pub(crate) fn teardown(&self) {
    tracing::trace!(component = self.handler.name(), "releasing instance");
    self.handler.run_release_hook(&self.activation.instance);
    self.activation.teardown_dependents();
  }
}
