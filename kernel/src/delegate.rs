//! Delegate contracts and the lazy loader that synthesizes them.
//!
//! Requesting `Contract::delegate::<T>()` when nothing is registered for it
//! lets [`DelegateFactory`] pick the component that serves `T` and register a
//! singleton `Delegate<T>` bound to the kernel. Calling the delegate resolves
//! that component on every invocation.

use crate::contract::{Callable, Contract};
use crate::descriptor::{project_self, Activator, Lifestyle, Projection, SyntheticRegistration};
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::instance::{Arguments, Instance};
use crate::kernel::{ActivationContext, Kernel, WeakKernel};
use crate::loader::LazyComponentLoader;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

impl Contract {
  /// The callable contract whose invocation yields an `Arc<T>`.
  pub fn delegate<T: ?Sized + Any + Send + Sync>() -> Self {
    Contract::with_callable::<Delegate<T>>(Callable::new(
      Contract::of::<T>(),
      bind_delegate::<T>,
      project_self::<Delegate<T>>,
    ))
  }
}

/// The component a delegate was bound to.
#[derive(Debug, Clone)]
pub struct DelegateTarget {
  component: String,
  returns: Contract,
}

impl DelegateTarget {
  pub fn component(&self) -> &str {
    &self.component
  }

  pub fn returns(&self) -> &Contract {
    &self.returns
  }
}

/// The concrete resolve request a selector derives from a delegate call.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
  pub name: Option<String>,
  pub arguments: Arguments,
}

/// Translates delegate call arguments into a resolve request.
pub trait ComponentSelector: Send + Sync {
  fn select(&self, target: &DelegateTarget, arguments: Arguments) -> ResolveRequest;
}

/// Resolves the bound component by name, passing the call arguments through.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSelector;

impl ComponentSelector for DefaultSelector {
  fn select(&self, target: &DelegateTarget, arguments: Arguments) -> ResolveRequest {
    ResolveRequest {
      name: Some(target.component.clone()),
      arguments,
    }
  }
}

#[derive(Clone)]
pub(crate) struct DelegateBinding {
  kernel: WeakKernel,
  target: DelegateTarget,
  selector: Arc<dyn ComponentSelector>,
}

fn bind_delegate<T: ?Sized + Any + Send + Sync>(binding: DelegateBinding) -> Instance {
  Instance::new(Arc::new(Delegate::<T> {
    binding,
    _marker: PhantomData,
  }))
}

/// A callable bound to the kernel that resolves a `T` on every call.
///
/// The kernel is held weakly; calling a delegate that outlived its kernel
/// fails with [`Error::KernelDisposed`].
pub struct Delegate<T: ?Sized> {
  binding: DelegateBinding,
  _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Any + Send + Sync> Delegate<T> {
  pub fn call(&self) -> Result<Arc<T>> {
    self.call_with(Arguments::new())
  }

  /// Resolves the target and hands it back already released: a transient
  /// target is torn down per call, a singleton is unaffected.
  pub fn call_with(&self, arguments: Arguments) -> Result<Arc<T>> {
    let kernel = self.binding.kernel.upgrade().ok_or(Error::KernelDisposed)?;
    let request = self.binding.selector.select(&self.binding.target, arguments);
    let instance = kernel.resolve_with::<T>(request.name.as_deref(), request.arguments)?;
    kernel.release(&instance);
    Ok(instance)
  }

  pub fn target(&self) -> &DelegateTarget {
    &self.binding.target
  }
}

impl<T: ?Sized> fmt::Debug for Delegate<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Delegate")
      .field("target", &self.binding.target)
      .finish()
  }
}

type ServiceNameExtractor = Arc<dyn Fn(Option<&str>) -> Option<String> + Send + Sync>;
type LoadFilter = Arc<dyn Fn(Option<&str>, &Contract) -> bool + Send + Sync>;

/// A [`LazyComponentLoader`] that answers delegate contracts.
///
/// Non-callable contracts and callables returning `()` are declined, as is
/// anything the `should_load` filter rejects. The service name used to pick
/// the target defaults to the requested name.
pub struct DelegateFactory {
  selector: Arc<dyn ComponentSelector>,
  service_name: ServiceNameExtractor,
  should_load: LoadFilter,
}

impl Default for DelegateFactory {
  fn default() -> Self {
    Self {
      selector: Arc::new(DefaultSelector),
      service_name: Arc::new(|key: Option<&str>| key.map(str::to_owned)),
      should_load: Arc::new(|_: Option<&str>, _: &Contract| true),
    }
  }
}

impl DelegateFactory {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_selector(mut self, selector: impl ComponentSelector + 'static) -> Self {
    self.selector = Arc::new(selector);
    self
  }

  pub fn with_service_name(
    mut self,
    extract: impl Fn(Option<&str>) -> Option<String> + Send + Sync + 'static,
  ) -> Self {
    self.service_name = Arc::new(extract);
    self
  }

  /// Filters applicable requests by requested name and delegate contract.
  /// Rejected requests are declined.
  pub fn with_should_load(
    mut self,
    filter: impl Fn(Option<&str>, &Contract) -> bool + Send + Sync + 'static,
  ) -> Self {
    self.should_load = Arc::new(filter);
    self
  }

  /// Nominates the one handler the delegate will resolve.
  fn target_handler(&self, kernel: &Kernel, returns: &Contract, service_name: Option<&str>) -> Result<Arc<Handler>> {
    let service_name = service_name.filter(|name| !name.is_empty());
    if let Some(handler) = service_name
      .and_then(|name| kernel.lookup_by_name(name))
      .filter(|handler| handler.is_assignable_to(returns))
    {
      return Ok(handler);
    }

    let handlers = kernel.get_assignable_handlers(returns);
    if let [handler] = handlers.as_slice() {
      return Ok(handler.clone());
    }

    let wanted = service_name.map(str::to_lowercase);
    let matching: Vec<&Arc<Handler>> = handlers
      .iter()
      .filter(|handler| wanted.as_deref() == Some(handler.name().to_lowercase().as_str()))
      .collect();
    if let [handler] = matching.as_slice() {
      return Ok((*handler).clone());
    }

    let candidates: Vec<String> = handlers.iter().map(|h| h.name().to_owned()).collect();
    tracing::warn!(
      contract = returns.type_name(),
      requested = service_name,
      candidates = ?candidates,
      "delegate factory could not nominate a unique component"
    );
    Err(Error::NoUniqueComponent {
      contract: returns.type_name().to_owned(),
      name: service_name.map(str::to_owned),
      candidates,
    })
  }
}

impl LazyComponentLoader for DelegateFactory {
  fn try_load(
    &self,
    kernel: &Kernel,
    name: Option<&str>,
    contract: &Contract,
  ) -> Result<Option<SyntheticRegistration>> {
    let Some(callable) = contract.callable() else {
      return Ok(None);
    };
    if !callable.has_return() || !(self.should_load)(name, contract) {
      return Ok(None);
    }

    let service_name = (self.service_name)(name);
    let handler = self.target_handler(kernel, callable.returns(), service_name.as_deref())?;

    let target = DelegateTarget {
      component: handler.name().to_owned(),
      returns: callable.returns().clone(),
    };
    let selector = self.selector.clone();
    let bind = callable.bind;
    let project: Projection = Arc::new(callable.project);
    let activator: Activator = Arc::new(move |ctx: &ActivationContext<'_>| {
      Ok(bind(DelegateBinding {
        kernel: ctx.kernel().downgrade(),
        target: target.clone(),
        selector: selector.clone(),
      }))
    });

    // One delegate registration per (delegate type, target component).
    let registration_name = format!("{}@{}", contract.type_name(), handler.name());
    tracing::debug!(
      contract = contract.type_name(),
      target = handler.name(),
      "synthesizing delegate registration"
    );
    Ok(Some(
      SyntheticRegistration::erased(registration_name, contract.clone(), Lifestyle::Singleton, activator, project)
        .bound_to(handler.name()),
    ))
  }
}
