//! Component descriptors and the typed `Component` builder that produces them.

use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::kernel::ActivationContext;

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Instance-sharing policy of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifestyle {
  /// One instance per handler, created on first resolve.
  #[default]
  Singleton,
  /// A new instance on every resolve.
  Transient,
  /// One instance per [`Scope`](crate::Scope).
  PerScope,
}

/// How a dependency requirement is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
  /// The dependency is constructed before the dependent.
  Eager,
  /// The dependent receives a delegate and resolves the target on demand.
  Deferred,
}

/// One entry of a descriptor's ordered dependency requirements.
#[derive(Debug, Clone)]
pub struct Dependency {
  contract: Contract,
  name: Option<String>,
  binding: Binding,
}

impl Dependency {
  pub fn on<T: ?Sized + Any>() -> Self {
    Self::on_contract(Contract::of::<T>())
  }

  pub fn named<T: ?Sized + Any>(name: impl Into<String>) -> Self {
    Self::on::<T>().with_name(name)
  }

  pub fn on_contract(contract: Contract) -> Self {
    Self {
      contract,
      name: None,
      binding: Binding::Eager,
    }
  }

  /// A requirement satisfied through a `Delegate<T>`, which breaks eager
  /// construction order and therefore dependency cycles.
  pub fn deferred<T: ?Sized + Any + Send + Sync>() -> Self {
    Self {
      contract: Contract::delegate::<T>(),
      name: None,
      binding: Binding::Deferred,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn contract(&self) -> &Contract {
    &self.contract
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn binding(&self) -> Binding {
    self.binding
  }

  pub fn is_deferred(&self) -> bool {
    self.binding == Binding::Deferred
  }
}

pub(crate) type Activator = Arc<dyn Fn(&ActivationContext<'_>) -> Result<Instance> + Send + Sync>;
pub(crate) type Projection = Arc<dyn Fn(&Instance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;
pub(crate) type ReleaseHook = Arc<dyn Fn(&Instance) + Send + Sync>;

/// A contract a descriptor is indexed under, with the cast that turns the
/// factory's `Arc<I>` into an `Arc` of the contract type.
#[derive(Clone)]
pub(crate) struct ServiceEntry {
  pub(crate) contract: Contract,
  pub(crate) project: Projection,
}

pub(crate) fn project_self<I: ?Sized + Any + Send + Sync>(
  instance: &Instance,
) -> Option<Box<dyn Any + Send + Sync>> {
  instance
    .downcast::<I>()
    .map(|value| Box::new(value) as Box<dyn Any + Send + Sync>)
}

/// Registered metadata binding a name, one or more contracts, an
/// implementation and a lifestyle. Immutable once built.
#[derive(Clone)]
pub struct ComponentDescriptor {
  pub(crate) name: String,
  pub(crate) services: Vec<ServiceEntry>,
  pub(crate) implementation: Contract,
  pub(crate) lifestyle: Lifestyle,
  pub(crate) requirements: Vec<Dependency>,
  pub(crate) activator: Activator,
  pub(crate) on_release: Option<ReleaseHook>,
  pub(crate) synthetic: bool,
  pub(crate) bound_to: Option<String>,
}

impl ComponentDescriptor {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn services(&self) -> impl Iterator<Item = &Contract> {
    self.services.iter().map(|entry| &entry.contract)
  }

  pub fn implementation(&self) -> &Contract {
    &self.implementation
  }

  pub fn lifestyle(&self) -> Lifestyle {
    self.lifestyle
  }

  pub fn requirements(&self) -> &[Dependency] {
    &self.requirements
  }

  /// True for registrations produced by a lazy component loader.
  pub fn is_synthetic(&self) -> bool {
    self.synthetic
  }

  /// The component a synthetic registration was generated for. It is
  /// unregistered together with that component.
  pub fn bound_to(&self) -> Option<&str> {
    self.bound_to.as_deref()
  }

  pub fn provides(&self, contract: &Contract) -> bool {
    contract.is_any() || self.services.iter().any(|entry| &entry.contract == contract)
  }

  pub(crate) fn project(&self, instance: &Instance, contract: &Contract) -> Option<Box<dyn Any + Send + Sync>> {
    if contract.is_any() {
      return Some(Box::new(instance.clone()));
    }
    self
      .services
      .iter()
      .find(|entry| &entry.contract == contract)
      .and_then(|entry| (entry.project)(instance))
  }
}

impl fmt::Debug for ComponentDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentDescriptor")
      .field("name", &self.name)
      .field("services", &self.services().collect::<Vec<_>>())
      .field("implementation", &self.implementation)
      .field("lifestyle", &self.lifestyle)
      .field("requirements", &self.requirements)
      .field("synthetic", &self.synthetic)
      .field("bound_to", &self.bound_to)
      .finish()
  }
}

/// Typed builder for a [`ComponentDescriptor`] whose factory produces `Arc<I>`.
///
/// Without any `service` call the component is registered under `I` itself.
///
/// ```
/// use fibre_kernel::{Component, Dependency, Kernel};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct English { punctuation: Arc<String> }
/// impl Greeter for English {
///   fn greet(&self) -> String { format!("Hello{}", self.punctuation) }
/// }
///
/// let kernel = Kernel::new();
/// kernel.register(Component::<String>::named("punctuation").instance(Arc::new("!".to_string()))).unwrap();
/// kernel
///   .register(
///     Component::<English>::named("greeter")
///       .service::<dyn Greeter>(|it| it as Arc<dyn Greeter>)
///       .depends_on(Dependency::named::<String>("punctuation"))
///       .factory(|ctx| Ok(Arc::new(English { punctuation: ctx.dependency::<String>(0)? }))),
///   )
///   .unwrap();
///
/// assert_eq!(kernel.resolve::<dyn Greeter>().unwrap().greet(), "Hello!");
/// ```
pub struct Component<I: ?Sized> {
  name: String,
  lifestyle: Lifestyle,
  services: Vec<ServiceEntry>,
  requirements: Vec<Dependency>,
  activator: Option<Activator>,
  on_release: Option<ReleaseHook>,
  _marker: PhantomData<fn() -> Arc<I>>,
}

impl<I: ?Sized + Any + Send + Sync> Component<I> {
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      lifestyle: Lifestyle::default(),
      services: Vec::new(),
      requirements: Vec::new(),
      activator: None,
      on_release: None,
      _marker: PhantomData,
    }
  }

  pub fn lifestyle(mut self, lifestyle: Lifestyle) -> Self {
    self.lifestyle = lifestyle;
    self
  }

  pub fn singleton(self) -> Self {
    self.lifestyle(Lifestyle::Singleton)
  }

  pub fn transient(self) -> Self {
    self.lifestyle(Lifestyle::Transient)
  }

  pub fn per_scope(self) -> Self {
    self.lifestyle(Lifestyle::PerScope)
  }

  /// Adds `S` as a service contract; `cast` is usually the identity closure
  /// relying on unsized coercion, e.g. `|it| it as Arc<dyn Greeter>`.
  pub fn service<S: ?Sized + Any + Send + Sync>(
    mut self,
    cast: impl Fn(Arc<I>) -> Arc<S> + Send + Sync + 'static,
  ) -> Self {
    let project: Projection = Arc::new(move |instance: &Instance| {
      instance
        .downcast::<I>()
        .map(|value| Box::new(cast(value)) as Box<dyn Any + Send + Sync>)
    });
    self.services.push(ServiceEntry {
      contract: Contract::of::<S>(),
      project,
    });
    self
  }

  pub fn depends_on(mut self, dependency: Dependency) -> Self {
    self.requirements.push(dependency);
    self
  }

  pub fn factory(
    mut self,
    factory: impl Fn(&ActivationContext<'_>) -> Result<Arc<I>> + Send + Sync + 'static,
  ) -> Self {
    self.activator = Some(Arc::new(move |ctx: &ActivationContext<'_>| factory(ctx).map(Instance::new)));
    self
  }

  /// Registers a pre-built value. Implies the singleton lifestyle.
  pub fn instance(mut self, value: Arc<I>) -> Self {
    self.lifestyle = Lifestyle::Singleton;
    self.activator = Some(Arc::new(move |_: &ActivationContext<'_>| Ok(Instance::new(value.clone()))));
    self
  }

  /// Called once when an instance of this component is torn down.
  pub fn on_release(mut self, hook: impl Fn(&Arc<I>) + Send + Sync + 'static) -> Self {
    self.on_release = Some(Arc::new(move |instance: &Instance| {
      if let Some(value) = instance.downcast::<I>() {
        hook(&value);
      }
    }));
    self
  }

  pub fn build(self) -> ComponentDescriptor {
    let mut services = self.services;
    if services.is_empty() {
      services.push(ServiceEntry {
        contract: Contract::of::<I>(),
        project: Arc::new(project_self::<I>),
      });
    }
    let name = self.name;
    let activator: Activator = match self.activator {
      Some(activator) => activator,
      None => {
        let component = name.clone();
        Arc::new(move |_: &ActivationContext<'_>| {
          Err(Error::activation(
            &component,
            format!("no factory or instance configured for {}", type_name::<I>()),
          ))
        })
      }
    };
    ComponentDescriptor {
      name,
      services,
      implementation: Contract::of::<I>(),
      lifestyle: self.lifestyle,
      requirements: self.requirements,
      activator,
      on_release: self.on_release,
      synthetic: false,
      bound_to: None,
    }
  }
}

impl<I: ?Sized + Any + Send + Sync> From<Component<I>> for ComponentDescriptor {
  fn from(component: Component<I>) -> Self {
    component.build()
  }
}

/// A registration proposed by a lazy component loader.
///
/// Shaped like any other descriptor but flagged as dynamically generated.
/// Ownership moves to the registry when the kernel accepts it.
pub struct SyntheticRegistration {
  descriptor: ComponentDescriptor,
}

impl SyntheticRegistration {
  pub fn new<I: ?Sized + Any + Send + Sync>(component: Component<I>) -> Self {
    let mut descriptor = component.build();
    descriptor.synthetic = true;
    Self { descriptor }
  }

  pub(crate) fn erased(
    name: String,
    contract: Contract,
    lifestyle: Lifestyle,
    activator: Activator,
    project: Projection,
  ) -> Self {
    Self {
      descriptor: ComponentDescriptor {
        name,
        implementation: contract.clone(),
        services: vec![ServiceEntry { contract, project }],
        lifestyle,
        requirements: Vec::new(),
        activator,
        on_release: None,
        synthetic: true,
        bound_to: None,
      },
    }
  }

  /// Ties the registration's lifetime to the component `name`.
  pub fn bound_to(mut self, name: impl Into<String>) -> Self {
    self.descriptor.bound_to = Some(name.into());
    self
  }

  pub fn descriptor(&self) -> &ComponentDescriptor {
    &self.descriptor
  }

  pub fn into_descriptor(self) -> ComponentDescriptor {
    self.descriptor
  }
}

impl fmt::Debug for SyntheticRegistration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("SyntheticRegistration").field(&self.descriptor).finish()
  }
}
