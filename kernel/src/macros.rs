//! Public macros for ergonomic service resolution.

/// Resolves a service from a kernel, panicking if it cannot be resolved.
///
/// Intended for application wiring code where a missing component is a
/// programming error. Use [`Kernel::resolve`](crate::Kernel::resolve) or
/// [`Kernel::resolve_named`](crate::Kernel::resolve_named) to handle the
/// error instead.
///
/// # Panics
///
/// Panics with the resolution error's message.
///
/// # Examples
///
/// ```
/// use fibre_kernel::{resolve, Component, Kernel};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let kernel = Kernel::new();
/// kernel.register(Component::<String>::named("message").instance(Arc::new("hello".to_string()))).unwrap();
/// kernel
///   .register(
///     Component::<EnglishGreeter>::named("english")
///       .service::<dyn Greeter>(|it| it as Arc<dyn Greeter>)
///       .factory(|_| Ok(Arc::new(EnglishGreeter))),
///   )
///   .unwrap();
///
/// let message = resolve!(kernel, String, "message");
/// assert_eq!(*message, "hello");
///
/// let greeter = resolve!(kernel, trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  // `:ident` for the trait name so `dyn` can be added in the expansion.
  ($kernel:expr, trait $trait_ident:ident) => {
    $kernel
      .resolve::<dyn $trait_ident>()
      .unwrap_or_else(|e| panic!("Failed to resolve required trait service: {}", e))
  };

  ($kernel:expr, trait $trait_ident:ident, $name:expr) => {
    $kernel
      .resolve_named::<dyn $trait_ident>($name)
      .unwrap_or_else(|e| panic!("Failed to resolve required trait service: {}", e))
  };

  ($kernel:expr, $type:ty) => {
    $kernel
      .resolve::<$type>()
      .unwrap_or_else(|e| panic!("Failed to resolve required service: {}", e))
  };

  ($kernel:expr, $type:ty, $name:expr) => {
    $kernel
      .resolve_named::<$type>($name)
      .unwrap_or_else(|e| panic!("Failed to resolve required service: {}", e))
  };
}
