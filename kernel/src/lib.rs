//! # Fibre Kernel
//!
//! A thread-safe inversion of control kernel.
//!
//! Components are registered as [`ComponentDescriptor`]s: a unique name, the
//! service contracts they satisfy, a factory and a [`Lifestyle`]. The kernel
//! resolves a request for a contract (optionally with a name) to one handler,
//! constructs its dependencies first and caches or tracks the result
//! according to the lifestyle.
//!
//! ## Core Concepts
//!
//! - **Compound names**: a component registered as `common:secure=true` can
//!   be found by the bare query `common` or the exact property set, see
//!   [`NamingKey`].
//! - **Cycle detection**: a request whose eager dependencies lead back to
//!   itself fails with [`Error::CircularDependency`] instead of overflowing
//!   the stack. Deferred dependencies break cycles.
//! - **Lazy loaders**: when nothing is registered for a request the kernel
//!   asks its [`LazyComponentLoader`]s, such as the [`DelegateFactory`], to
//!   synthesize a registration.
//! - **Delegates**: a [`Delegate<T>`] resolves a fresh `T` on every call.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_kernel::{Component, Dependency, DelegateFactory, Kernel};
//! use std::sync::Arc;
//!
//! struct Connection;
//! struct Pool {
//!   connect: Arc<fibre_kernel::Delegate<Connection>>,
//! }
//!
//! let kernel = Kernel::new();
//! kernel.add_loader(DelegateFactory::new());
//!
//! kernel
//!   .register(Component::<Connection>::named("connection").transient().factory(|_| Ok(Arc::new(Connection))))
//!   .unwrap();
//! kernel
//!   .register(
//!     Component::<Pool>::named("pool")
//!       .depends_on(Dependency::deferred::<Connection>())
//!       .factory(|ctx| Ok(Arc::new(Pool { connect: ctx.delegate::<Connection>(0)? }))),
//!   )
//!   .unwrap();
//!
//! let pool = kernel.resolve::<Pool>().unwrap();
//! let first = pool.connect.call().unwrap();
//! let second = pool.connect.call().unwrap();
//! assert!(!Arc::ptr_eq(&first, &second));
//! ```

mod config;
mod contract;
mod delegate;
mod descriptor;
mod error;
mod graph;
mod handler;
mod instance;
mod kernel;
mod loader;
mod macros;
mod naming;
mod registry;

pub use config::{DelegateFactoryConfig, ForwardConfig, KernelConfig};
pub use contract::{Callable, Contract};
pub use delegate::{ComponentSelector, DefaultSelector, Delegate, DelegateFactory, DelegateTarget, ResolveRequest};
pub use descriptor::{Binding, Component, ComponentDescriptor, Dependency, Lifestyle, SyntheticRegistration};
pub use error::{Error, Result};
pub use graph::DependencyGraphNode;
pub use handler::{Handler, HandlerState};
pub use instance::{Arguments, Instance};
pub use kernel::{ActivationContext, Kernel, Scope, WeakKernel};
pub use loader::LazyComponentLoader;
pub use naming::NamingKey;
