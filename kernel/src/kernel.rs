//! The resolution kernel.

use crate::config::KernelConfig;
use crate::contract::Contract;
use crate::delegate::{Delegate, DelegateFactory};
use crate::descriptor::{ComponentDescriptor, Lifestyle};
use crate::error::{Error, Result};
use crate::graph::{self, DependencyGraphNode, ResolutionGuard};
use crate::handler::{teardown_all, Activation, Burden, Handler};
use crate::instance::{address_of, Arguments, Instance};
use crate::loader::LazyComponentLoader;
use crate::naming::NamingKey;
use crate::registry::ComponentRegistry;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

/// The inversion of control kernel.
///
/// `Kernel` is a cheap handle; clones share the same registry. Components
/// that need to resolve further services receive the kernel through their
/// [`ActivationContext`]. Components that keep it beyond activation should
/// hold a [`WeakKernel`] so they do not keep the kernel alive.
#[derive(Clone)]
pub struct Kernel {
  inner: Arc<KernelInner>,
}

/// A non-owning kernel handle.
#[derive(Clone)]
pub struct WeakKernel {
  inner: Weak<KernelInner>,
}

impl WeakKernel {
  pub fn upgrade(&self) -> Option<Kernel> {
    self.inner.upgrade().map(|inner| Kernel { inner })
  }
}

pub(crate) struct KernelInner {
  registry: Arc<ComponentRegistry>,
  loaders: RwLock<Vec<Arc<dyn LazyComponentLoader>>>,
  // (requested contract, requested name) -> registered synthetic component
  synthesized: DashMap<(Contract, Option<String>), String>,
  // Transient instances with release work pending, by instance address.
  tracked: DashMap<usize, Burden>,
  scoped: DashMap<usize, Weak<ScopeInner>>,
}

struct Resolved {
  handler: Arc<Handler>,
  instance: Instance,
  burden: Option<Burden>,
}

impl Default for Kernel {
  fn default() -> Self {
    Self::new()
  }
}

impl Kernel {
  /// Creates an empty kernel without any lazy component loaders.
  pub fn new() -> Self {
    Self {
      inner: Arc::new(KernelInner {
        registry: ComponentRegistry::new(),
        loaders: RwLock::new(Vec::new()),
        synthesized: DashMap::new(),
        tracked: DashMap::new(),
        scoped: DashMap::new(),
      }),
    }
  }

  /// Creates a kernel configured from `config`: the delegate factory when
  /// enabled, then named queries and forwards.
  pub fn from_config(config: &KernelConfig) -> Result<Self> {
    let kernel = Self::new();
    if config.delegate_factory.enabled {
      kernel.add_loader(DelegateFactory::new());
    }
    config.apply(&kernel)?;
    Ok(kernel)
  }

  pub fn downgrade(&self) -> WeakKernel {
    WeakKernel {
      inner: Arc::downgrade(&self.inner),
    }
  }

  fn id(&self) -> usize {
    Arc::as_ptr(&self.inner) as usize
  }

  // --- Registration ---

  /// Registers a component. Fails with `DuplicateName` when the name is
  /// already used by a component, forward or named query.
  pub fn register(&self, descriptor: impl Into<ComponentDescriptor>) -> Result<()> {
    let descriptor = descriptor.into();
    let handler = self.inner.registry.register(descriptor)?;
    tracing::debug!(
      component = handler.name(),
      lifestyle = ?handler.lifestyle(),
      synthetic = handler.descriptor().is_synthetic(),
      "registered component"
    );
    Ok(())
  }

  /// Removes a component and disposes its cached singleton. Synthetic
  /// registrations bound to it are removed along with it.
  pub fn unregister(&self, name: &str) -> Result<()> {
    let removed = {
      let mut registry = self.inner.registry.write();
      let Some(handler) = registry.remove(name) else {
        return Err(Error::ComponentNotFound {
          contract: Contract::any().type_name().to_owned(),
          name: Some(name.to_owned()),
        });
      };
      let mut removed = vec![handler];
      let mut next = 0;
      while next < removed.len() {
        let bound: Vec<String> = registry
          .handlers()
          .iter()
          .filter(|handler| handler.descriptor().bound_to() == Some(removed[next].name()))
          .map(|handler| handler.name().to_owned())
          .collect();
        removed.extend(bound.iter().filter_map(|bound_name| registry.remove(bound_name)));
        next += 1;
      }
      removed
    };

    self
      .inner
      .synthesized
      .retain(|_, component| !removed.iter().any(|handler| handler.name() == component.as_str()));
    // Bound registrations go first; they may hold the target.
    for handler in removed.iter().rev() {
      tracing::debug!(component = handler.name(), "unregistered component");
      handler.dispose();
    }
    Ok(())
  }

  /// Makes `alias` resolve through `target` without creating a handler.
  pub fn register_forwarding(&self, alias: impl Into<String>, target: impl Into<String>) -> Result<()> {
    self.inner.registry.write().add_forward(alias.into(), target.into())
  }

  /// Makes `alias` resolve as the compound naming query `key`.
  pub fn add_named_query(&self, alias: impl Into<String>, key: NamingKey) -> Result<()> {
    self.inner.registry.write().add_query(alias.into(), key)
  }

  /// Appends a loader to the chain consulted on resolution misses.
  pub fn add_loader(&self, loader: impl LazyComponentLoader + 'static) {
    self.inner.loaders.write().push(Arc::new(loader));
  }

  // --- Queries ---

  pub fn lookup_by_name(&self, name: &str) -> Option<Arc<Handler>> {
    self.inner.registry.read().lookup_by_name(name)
  }

  pub fn lookup_by_contract(&self, contract: &Contract) -> Vec<Arc<Handler>> {
    self.inner.registry.read().lookup_by_contract(contract)
  }

  pub fn resolve_query(&self, key: &NamingKey) -> Option<Arc<Handler>> {
    self.inner.registry.read().resolve_query(key)
  }

  /// Every handler assignable to `contract`, in registration order.
  /// `Contract::any()` lists all handlers.
  pub fn get_assignable_handlers(&self, contract: &Contract) -> Vec<Arc<Handler>> {
    self.inner.registry.read().assignable(contract)
  }

  pub fn graph_nodes(&self) -> Vec<DependencyGraphNode> {
    graph::graph_nodes(&self.inner.registry.read())
  }

  // --- Resolution ---

  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_with::<T>(None, Arguments::new())
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self.resolve_with::<T>(Some(name), Arguments::new())
  }

  /// Resolves with inline arguments visible to the factory through
  /// [`ActivationContext::argument`]. Cached instances ignore them.
  pub fn resolve_with<T: ?Sized + Any + Send + Sync>(
    &self,
    name: Option<&str>,
    arguments: Arguments,
  ) -> Result<Arc<T>> {
    let contract = Contract::of::<T>();
    let resolved = self.resolve_in(&contract, name, &arguments, None)?;
    self.finish::<T>(resolved, &contract)
  }

  /// Like [`resolve`](Self::resolve) but fails with `AmbiguousComponent`
  /// when more than one satisfiable handler could serve `T`.
  pub fn resolve_unique<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let contract = Contract::of::<T>();
    let candidates = self.inner.registry.read().valid_candidates(&contract);
    if candidates.len() > 1 {
      let candidates: Vec<String> = candidates.iter().map(|h| h.name().to_owned()).collect();
      tracing::warn!(contract = contract.type_name(), candidates = ?candidates, "ambiguous component");
      return Err(Error::AmbiguousComponent {
        contract: contract.type_name().to_owned(),
        name: None,
        candidates,
      });
    }
    self.resolve::<T>()
  }

  /// Resolves the delegate for `T`, synthesizing it through the loader chain
  /// on first use.
  pub fn resolve_delegate<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>) -> Result<Arc<Delegate<T>>> {
    let contract = Contract::delegate::<T>();
    let resolved = self.resolve_in(&contract, name, &Arguments::new(), None)?;
    self.finish::<Delegate<T>>(resolved, &contract)
  }

  /// Type-erased resolution. The returned instance is the factory's value.
  pub fn resolve_instance(&self, contract: &Contract, name: Option<&str>) -> Result<Instance> {
    let resolved = self.resolve_in(contract, name, &Arguments::new(), None)?;
    let instance = resolved.instance.clone();
    self.track(resolved.burden);
    Ok(instance)
  }

  /// Creates a scope for `PerScope` components.
  pub fn begin_scope(&self) -> Scope {
    Scope {
      kernel: self.clone(),
      inner: Arc::new(ScopeInner::default()),
    }
  }

  /// Releases an instance obtained from this kernel.
  ///
  /// Transient and scoped instances are torn down together with the
  /// dependencies they alone own. Singletons only lose a logical reference;
  /// they live until their handler is disposed. Returns whether the instance
  /// was known to the kernel.
  pub fn release<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
    self.release_address(address_of(instance))
  }

  pub fn release_instance(&self, instance: &Instance) -> bool {
    self.release_address(instance.address())
  }

  fn release_address(&self, address: usize) -> bool {
    if let Some((_, burden)) = self.inner.tracked.remove(&address) {
      burden.teardown();
      return true;
    }
    if let Some((_, scope)) = self.inner.scoped.remove(&address) {
      return scope.upgrade().is_some_and(|scope| scope.evict(address));
    }
    let singleton = self
      .inner
      .registry
      .read()
      .handlers()
      .iter()
      .find(|handler| handler.singleton_address() == Some(address))
      .cloned();
    match singleton {
      Some(handler) => {
        tracing::trace!(component = handler.name(), "released singleton reference");
        handler.release_reference();
        true
      }
      None => false,
    }
  }

  // --- Internals ---

  fn finish<T: ?Sized + Any + Send + Sync>(&self, resolved: Resolved, contract: &Contract) -> Result<Arc<T>> {
    let value = resolved
      .handler
      .project(&resolved.instance, contract)
      .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
      .map(|boxed| *boxed);
    match value {
      Some(value) => {
        self.track(resolved.burden);
        Ok(value)
      }
      None => {
        match resolved.burden {
          Some(burden) => burden.teardown(),
          None if resolved.handler.lifestyle() == Lifestyle::Singleton => resolved.handler.release_reference(),
          None => {}
        }
        Err(Error::activation(
          resolved.handler.name(),
          format!("instance does not provide {}", contract.type_name()),
        ))
      }
    }
  }

  fn track(&self, burden: Option<Burden>) {
    if let Some(burden) = burden.filter(Burden::needs_tracking) {
      self.inner.tracked.insert(burden.address(), burden);
    }
  }

  fn resolve_in(
    &self,
    contract: &Contract,
    name: Option<&str>,
    arguments: &Arguments,
    scope: Option<&Arc<ScopeInner>>,
  ) -> Result<Resolved> {
    let handler = self.handler_for(contract, name)?;
    let (instance, burden) = self.materialize(&handler, contract, arguments, scope)?;
    Ok(Resolved {
      handler,
      instance,
      burden,
    })
  }

  fn handler_for(&self, contract: &Contract, name: Option<&str>) -> Result<Arc<Handler>> {
    if let Some(handler) = self.inner.registry.read().select(contract, name) {
      return Ok(handler);
    }
    let key = (contract.clone(), name.map(str::to_owned));
    let synthesized = self.inner.synthesized.get(&key).map(|entry| entry.value().clone());
    if let Some(handler) = synthesized.and_then(|component| self.lookup_by_name(&component)) {
      return Ok(handler);
    }
    tracing::debug!(contract = contract.type_name(), requested = name, "resolution miss, consulting lazy loaders");
    self.load_lazily(contract, name)
  }

  fn load_lazily(&self, contract: &Contract, name: Option<&str>) -> Result<Arc<Handler>> {
    let loaders = self.inner.loaders.read().clone();
    for loader in loaders {
      let Some(registration) = loader.try_load(self, name, contract)? else {
        continue;
      };
      let descriptor = registration.into_descriptor();
      let component = descriptor.name().to_owned();
      if !descriptor.provides(contract) {
        tracing::warn!(
          contract = contract.type_name(),
          component = %component,
          "lazy loader proposed a registration that does not serve the request, skipping it"
        );
        continue;
      }
      match self.register(descriptor) {
        Ok(()) => {}
        // Another thread synthesized the same registration first. An
        // unrelated holder of the name is reported below.
        Err(Error::DuplicateName { .. }) => {}
        Err(e) => return Err(e),
      }
      let handler = self
        .lookup_by_name(&component)
        .filter(|handler| handler.is_assignable_to(contract))
        .ok_or_else(|| Error::DuplicateName {
          name: component.clone(),
        })?;
      tracing::debug!(contract = contract.type_name(), component = %component, "lazy loader produced registration");
      self
        .inner
        .synthesized
        .insert((contract.clone(), name.map(str::to_owned)), component);
      return Ok(handler);
    }
    Err(Error::ComponentNotFound {
      contract: contract.type_name().to_owned(),
      name: name.map(str::to_owned),
    })
  }

  fn ensure_acyclic(&self, handler: &Arc<Handler>, contract: &Contract) -> Result<()> {
    graph::ensure_acyclic(&self.inner.registry.read(), handler, contract)
  }

  fn materialize(
    &self,
    handler: &Arc<Handler>,
    contract: &Contract,
    arguments: &Arguments,
    scope: Option<&Arc<ScopeInner>>,
  ) -> Result<(Instance, Option<Burden>)> {
    match handler.lifestyle() {
      Lifestyle::Singleton => {
        if let Some(activation) = handler.singleton.get() {
          handler.acquire();
          return Ok((activation.instance.clone(), None));
        }
        self.ensure_acyclic(handler, contract)?;
        let _guard = ResolutionGuard::enter(self.id(), handler.name(), contract)?;
        // Singletons never capture a scope.
        let activation = handler
          .singleton
          .get_or_try_init(|| self.activate(handler, arguments, None))?;
        handler.acquire();
        Ok((activation.instance.clone(), None))
      }
      Lifestyle::Transient => {
        self.ensure_acyclic(handler, contract)?;
        let _guard = ResolutionGuard::enter(self.id(), handler.name(), contract)?;
        let activation = self.activate(handler, arguments, scope)?;
        let instance = activation.instance.clone();
        Ok((
          instance,
          Some(Burden {
            handler: handler.clone(),
            activation,
          }),
        ))
      }
      Lifestyle::PerScope => {
        let scope = scope.ok_or_else(|| Error::NoActiveScope {
          component: handler.name().to_owned(),
        })?;
        if let Some(instance) = scope.cached(handler) {
          return Ok((instance, None));
        }
        // Guard before touching the cell; re-entering it would block.
        self.ensure_acyclic(handler, contract)?;
        let _guard = ResolutionGuard::enter(self.id(), handler.name(), contract)?;
        let (instance, created) = scope.get_or_create(handler, || self.activate(handler, arguments, Some(scope)))?;
        if created {
          self.inner.scoped.insert(instance.address(), Arc::downgrade(scope));
        }
        Ok((instance, None))
      }
    }
  }

  fn activate(
    &self,
    handler: &Arc<Handler>,
    arguments: &Arguments,
    scope: Option<&Arc<ScopeInner>>,
  ) -> Result<Activation> {
    let descriptor = handler.descriptor();
    let mut dependencies = Vec::with_capacity(descriptor.requirements().len());
    let mut owned = Vec::new();
    let mut shared = Vec::new();

    for dependency in descriptor.requirements() {
      let resolved = match self.resolve_in(dependency.contract(), dependency.name(), &Arguments::new(), scope) {
        Ok(resolved) => resolved,
        Err(e) => {
          teardown_all(&owned, &shared);
          return Err(e);
        }
      };
      let value = resolved.handler.project(&resolved.instance, dependency.contract());
      resolved.hold(&mut owned, &mut shared);
      match value {
        Some(value) => dependencies.push(value),
        None => {
          teardown_all(&owned, &shared);
          return Err(Error::activation(
            handler.name(),
            format!("dependency does not provide {}", dependency.contract().type_name()),
          ));
        }
      }
    }

    let ctx = ActivationContext {
      kernel: self,
      component: handler.name(),
      dependencies,
      arguments,
      scope,
      owned: RefCell::new(owned),
      shared: RefCell::new(shared),
    };
    let result = (descriptor.activator)(&ctx);
    let dependents = ctx.owned.into_inner();
    let shared = ctx.shared.into_inner();
    match result {
      Ok(instance) => Ok(Activation {
        instance,
        dependents,
        shared,
      }),
      Err(e) => {
        teardown_all(&dependents, &shared);
        Err(e)
      }
    }
  }
}

impl Resolved {
  // Hands what the consumer now holds to its owner: transient burdens to
  // tear down, singleton references to give back.
  fn hold(self, owned: &mut Vec<Burden>, shared: &mut Vec<Arc<Handler>>) {
    if self.handler.lifestyle() == Lifestyle::Singleton {
      shared.push(self.handler);
    }
    owned.extend(self.burden);
  }
}

impl fmt::Debug for Kernel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Kernel")
      .field("components", &self.inner.registry.read().handlers().len())
      .field("loaders", &self.inner.loaders.read().len())
      .finish()
  }
}

impl Drop for KernelInner {
  fn drop(&mut self) {
    let tracked: Vec<usize> = self.tracked.iter().map(|entry| *entry.key()).collect();
    for address in tracked {
      if let Some((_, burden)) = self.tracked.remove(&address) {
        burden.teardown();
      }
    }
    let handlers = self.registry.read().handlers().to_vec();
    for handler in handlers.iter().rev() {
      handler.dispose();
    }
  }
}

/// What a factory sees while its component is being created.
pub struct ActivationContext<'a> {
  kernel: &'a Kernel,
  component: &'a str,
  dependencies: Vec<Box<dyn Any + Send + Sync>>,
  arguments: &'a Arguments,
  scope: Option<&'a Arc<ScopeInner>>,
  owned: RefCell<Vec<Burden>>,
  shared: RefCell<Vec<Arc<Handler>>>,
}

impl<'a> ActivationContext<'a> {
  pub fn kernel(&self) -> &Kernel {
    self.kernel
  }

  /// Name of the component being activated.
  pub fn component(&self) -> &str {
    self.component
  }

  /// The resolved requirement at `index`, in declaration order.
  pub fn dependency<T: ?Sized + Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
    self
      .dependencies
      .get(index)
      .and_then(|value| value.downcast_ref::<Arc<T>>())
      .cloned()
      .ok_or_else(|| {
        Error::activation(
          self.component,
          format!("no dependency of type {} at index {}", std::any::type_name::<T>(), index),
        )
      })
  }

  /// The delegate for a deferred requirement at `index`.
  pub fn delegate<T: ?Sized + Any + Send + Sync>(&self, index: usize) -> Result<Arc<Delegate<T>>> {
    self.dependency::<Delegate<T>>(index)
  }

  pub fn argument<T: Any>(&self) -> Option<&T> {
    self.arguments.get::<T>()
  }

  pub fn arguments(&self) -> &Arguments {
    self.arguments
  }

  /// Resolves through the kernel during activation. Transient results are
  /// owned by the component being activated and torn down with it; singleton
  /// references are given back at the same time.
  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_inner::<T>(None)
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self.resolve_inner::<T>(Some(name))
  }

  fn resolve_inner<T: ?Sized + Any + Send + Sync>(&self, name: Option<&str>) -> Result<Arc<T>> {
    let contract = Contract::of::<T>();
    let resolved = self
      .kernel
      .resolve_in(&contract, name, &Arguments::new(), self.scope)?;
    let value = resolved
      .handler
      .project(&resolved.instance, &contract)
      .and_then(|boxed| boxed.downcast::<Arc<T>>().ok())
      .map(|boxed| *boxed);
    resolved.hold(&mut self.owned.borrow_mut(), &mut self.shared.borrow_mut());
    value.ok_or_else(|| {
      Error::activation(
        self.component,
        format!("instance does not provide {}", contract.type_name()),
      )
    })
  }
}

#[derive(Default)]
pub(crate) struct ScopeInner {
  cells: DashMap<String, Arc<OnceCell<Instance>>>,
  burdens: Mutex<Vec<Burden>>,
}

impl ScopeInner {
  fn cached(&self, handler: &Handler) -> Option<Instance> {
    self
      .cells
      .get(handler.name())
      .and_then(|cell| cell.get().cloned())
  }

  /// Returns the scope's instance of `handler`, creating it at most once.
  fn get_or_create(
    &self,
    handler: &Arc<Handler>,
    create: impl FnOnce() -> Result<Activation>,
  ) -> Result<(Instance, bool)> {
    // Clone the cell out so no map shard is locked during activation.
    let cell = self
      .cells
      .entry(handler.name().to_owned())
      .or_default()
      .value()
      .clone();
    let mut created = false;
    let instance = cell.get_or_try_init(|| {
      let activation = create()?;
      created = true;
      let instance = activation.instance.clone();
      self.burdens.lock().push(Burden {
        handler: handler.clone(),
        activation,
      });
      Ok::<_, Error>(instance)
    })?;
    Ok((instance.clone(), created))
  }

  fn evict(&self, address: usize) -> bool {
    let burden = {
      let mut burdens = self.burdens.lock();
      let position = burdens.iter().position(|b| b.address() == address);
      position.map(|i| burdens.remove(i))
    };
    let Some(burden) = burden else {
      return false;
    };
    self
      .cells
      .retain(|_, cell| cell.get().map(Instance::address) != Some(address));
    burden.teardown();
    true
  }
}

/// A unit of work owning `PerScope` instances.
///
/// Dropping the scope tears its instances down in reverse creation order.
pub struct Scope {
  kernel: Kernel,
  inner: Arc<ScopeInner>,
}

impl Scope {
  pub fn kernel(&self) -> &Kernel {
    &self.kernel
  }

  pub fn resolve<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.resolve_with::<T>(None, Arguments::new())
  }

  pub fn resolve_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    self.resolve_with::<T>(Some(name), Arguments::new())
  }

  pub fn resolve_with<T: ?Sized + Any + Send + Sync>(
    &self,
    name: Option<&str>,
    arguments: Arguments,
  ) -> Result<Arc<T>> {
    let contract = Contract::of::<T>();
    let resolved = self
      .kernel
      .resolve_in(&contract, name, &arguments, Some(&self.inner))?;
    self.kernel.finish::<T>(resolved, &contract)
  }

  /// Same as [`Kernel::release`].
  pub fn release<T: ?Sized>(&self, instance: &Arc<T>) -> bool {
    self.kernel.release(instance)
  }
}

impl Drop for Scope {
  fn drop(&mut self) {
    let burdens = std::mem::take(&mut *self.inner.burdens.lock());
    for burden in burdens.iter().rev() {
      self.kernel.inner.scoped.remove(&burden.address());
      burden.teardown();
    }
    self.inner.cells.clear();
  }
}
