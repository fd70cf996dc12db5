use fibre_kernel::{
  Arguments, Component, ComponentSelector, Contract, Delegate, DelegateFactory, DelegateTarget, Error, Kernel,
  LazyComponentLoader, ResolveRequest, Result, SyntheticRegistration,
};
use pretty_assertions::assert_eq;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

// --- Test Fixtures ---

trait Common: Send + Sync {
  fn id(&self) -> &'static str;
}

struct CommonImpl1;
impl Common for CommonImpl1 {
  fn id(&self) -> &'static str {
    "impl1"
  }
}

struct CommonImpl2;
impl Common for CommonImpl2 {
  fn id(&self) -> &'static str {
    "impl2"
  }
}

fn kernel_with_delegates() -> Kernel {
  let kernel = Kernel::new();
  kernel.add_loader(DelegateFactory::new());
  kernel
}

fn register_impl1(kernel: &Kernel, name: &str) {
  kernel
    .register(
      Component::<CommonImpl1>::named(name)
        .service::<dyn Common>(|it| it as Arc<dyn Common>)
        .factory(|_| Ok(Arc::new(CommonImpl1))),
    )
    .unwrap();
}

fn register_impl2(kernel: &Kernel, name: &str) {
  kernel
    .register(
      Component::<CommonImpl2>::named(name)
        .service::<dyn Common>(|it| it as Arc<dyn Common>)
        .factory(|_| Ok(Arc::new(CommonImpl2))),
    )
    .unwrap();
}

// --- Delegate Factory Tests ---

#[test]
fn test_two_candidates_without_a_name_are_not_unique() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "first");
  register_impl2(&kernel, "second");

  let err = kernel.resolve_delegate::<dyn Common>(None).unwrap_err();
  match &err {
    Error::NoUniqueComponent { contract, name, candidates } => {
      assert!(contract.contains("Common"));
      assert_eq!(*name, None);
      assert_eq!(*candidates, vec!["first", "second"]);
    }
    other => panic!("unexpected error: {}", other),
  }
  assert!(err.is_ambiguous());
}

#[test]
fn test_single_candidate_is_returned_on_every_call() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "only");

  let delegate = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(delegate.target().component(), "only");
  assert_eq!(delegate.target().returns(), &Contract::of::<dyn Common>());
  for _ in 0..3 {
    assert_eq!(delegate.call().unwrap().id(), "impl1");
  }

  // The synthesized registration is a singleton and is reused.
  let again = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert!(Arc::ptr_eq(&delegate, &again));
  let synthetic: Vec<_> = kernel
    .get_assignable_handlers(&Contract::any())
    .into_iter()
    .filter(|h| h.descriptor().is_synthetic())
    .collect();
  assert_eq!(synthetic.len(), 1);
}

#[test]
fn test_exact_name_nominates_the_target() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "first");
  register_impl2(&kernel, "second");

  let delegate = kernel.resolve_delegate::<dyn Common>(Some("second")).unwrap();
  assert_eq!(delegate.call().unwrap().id(), "impl2");

  let other = kernel.resolve_delegate::<dyn Common>(Some("first")).unwrap();
  assert_eq!(other.call().unwrap().id(), "impl1");
  assert!(!Arc::ptr_eq(&delegate, &other));
}

#[test]
fn test_case_insensitive_name_narrows_candidates() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "Primary");
  register_impl2(&kernel, "Secondary");

  let delegate = kernel.resolve_delegate::<dyn Common>(Some("secondary")).unwrap();
  assert_eq!(delegate.target().component(), "Secondary");
  assert_eq!(delegate.call().unwrap().id(), "impl2");

  let err = kernel.resolve_delegate::<dyn Common>(Some("tertiary")).unwrap_err();
  assert!(matches!(err, Error::NoUniqueComponent { name: Some(ref n), .. } if n == "tertiary"));
}

#[test]
fn test_transient_targets_are_released_per_call() {
  static CREATED: AtomicUsize = AtomicUsize::new(0);
  static RELEASED: AtomicUsize = AtomicUsize::new(0);

  struct Worker;

  let kernel = kernel_with_delegates();
  kernel
    .register(
      Component::<Worker>::named("worker")
        .transient()
        .factory(|_| {
          CREATED.fetch_add(1, Ordering::SeqCst);
          Ok(Arc::new(Worker))
        })
        .on_release(|_| {
          RELEASED.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

  let delegate = kernel.resolve_delegate::<Worker>(None).unwrap();
  let first = delegate.call().unwrap();
  let second = delegate.call().unwrap();
  assert!(!Arc::ptr_eq(&first, &second));
  assert_eq!(CREATED.load(Ordering::SeqCst), 2);
  assert_eq!(RELEASED.load(Ordering::SeqCst), 2);

  // Nothing is left for the caller to release.
  assert!(!kernel.release(&first));
}

#[test]
fn test_singleton_targets_are_unaffected_by_release() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "single");

  let delegate = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  let first = delegate.call().unwrap();
  let second = delegate.call().unwrap();
  assert!(Arc::ptr_eq(&first, &second));
  assert!(kernel.lookup_by_name("single").unwrap().is_activated());
}

#[test]
fn test_void_and_plain_contracts_are_declined() {
  let kernel = kernel_with_delegates();

  let err = kernel.resolve_delegate::<()>(None).unwrap_err();
  assert!(matches!(err, Error::ComponentNotFound { .. }));

  let err = kernel.resolve::<dyn Common>().err().unwrap();
  assert!(matches!(err, Error::ComponentNotFound { .. }));

  let factory = DelegateFactory::new();
  assert!(factory
    .try_load(&kernel, None, &Contract::of::<dyn Common>())
    .unwrap()
    .is_none());
  assert!(factory.try_load(&kernel, None, &Contract::delegate::<()>()).unwrap().is_none());
}

#[test]
fn test_missing_target_cannot_be_nominated() {
  let kernel = kernel_with_delegates();
  let err = kernel.resolve_delegate::<dyn Common>(None).unwrap_err();
  match &err {
    Error::NoUniqueComponent { contract, name, candidates } => {
      assert!(contract.contains("Common"));
      assert_eq!(*name, None);
      assert!(candidates.is_empty());
    }
    other => panic!("unexpected error: {}", other),
  }
  assert!(kernel.get_assignable_handlers(&Contract::any()).is_empty());

  // Registering a target later makes the delegate available.
  register_impl1(&kernel, "late");
  assert_eq!(kernel.resolve_delegate::<dyn Common>(None).unwrap().call().unwrap().id(), "impl1");
}

#[test]
fn test_unregistering_the_target_drops_its_delegate() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "t1");
  let old = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(old.target().component(), "t1");

  kernel.unregister("t1").unwrap();
  assert!(kernel.get_assignable_handlers(&Contract::any()).is_empty());

  register_impl2(&kernel, "t2");
  let fresh = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(fresh.target().component(), "t2");
  assert_eq!(fresh.call().unwrap().id(), "impl2");

  // The old delegate still points at the removed component.
  assert!(matches!(old.call(), Err(Error::ComponentNotFound { name: Some(ref n), .. }) if n == "t1"));
}

#[test]
fn test_should_load_filter_declines() {
  let kernel = Kernel::new();
  kernel.add_loader(DelegateFactory::new().with_should_load(|name: Option<&str>, _: &Contract| name != Some("off")));
  register_impl1(&kernel, "first");

  let err = kernel.resolve_delegate::<dyn Common>(Some("off")).unwrap_err();
  assert!(matches!(err, Error::ComponentNotFound { name: Some(ref n), .. } if n == "off"));
  assert_eq!(kernel.resolve_delegate::<dyn Common>(Some("first")).unwrap().call().unwrap().id(), "impl1");

  let factory = DelegateFactory::new().with_should_load(|_: Option<&str>, _: &Contract| false);
  assert!(factory
    .try_load(&kernel, None, &Contract::delegate::<dyn Common>())
    .unwrap()
    .is_none());
}

#[test]
fn test_custom_selector_translates_arguments() {
  struct ByArgument;
  impl ComponentSelector for ByArgument {
    fn select(&self, _target: &DelegateTarget, arguments: Arguments) -> ResolveRequest {
      ResolveRequest {
        name: arguments.get::<&'static str>().map(|name| name.to_string()),
        arguments,
      }
    }
  }

  let kernel = Kernel::new();
  kernel.add_loader(DelegateFactory::new().with_selector(ByArgument));
  register_impl1(&kernel, "first");
  register_impl2(&kernel, "second");

  let delegate = kernel.resolve_delegate::<dyn Common>(Some("first")).unwrap();
  let picked = delegate.call_with(Arguments::new().with("second")).unwrap();
  assert_eq!(picked.id(), "impl2");
  let picked = delegate.call_with(Arguments::new().with("first")).unwrap();
  assert_eq!(picked.id(), "impl1");
}

#[test]
fn test_call_arguments_reach_the_target() {
  struct Greeting(String);

  let kernel = kernel_with_delegates();
  kernel
    .register(Component::<Greeting>::named("greeting").transient().factory(|ctx| {
      let who = ctx.argument::<String>().cloned().unwrap_or_default();
      Ok(Arc::new(Greeting(format!("hello {}", who))))
    }))
    .unwrap();

  let delegate = kernel.resolve_delegate::<Greeting>(None).unwrap();
  let greeting = delegate.call_with(Arguments::new().with("kernel".to_string())).unwrap();
  assert_eq!(greeting.0, "hello kernel");
}

#[test]
fn test_delegate_outliving_its_kernel() {
  let kernel = kernel_with_delegates();
  register_impl1(&kernel, "only");
  let delegate: Arc<Delegate<dyn Common>> = kernel.resolve_delegate(None).unwrap();
  drop(kernel);

  assert!(matches!(delegate.call(), Err(Error::KernelDisposed)));
}

#[test]
fn test_service_name_extractor() {
  let kernel = Kernel::new();
  kernel.add_loader(
    DelegateFactory::new()
      .with_service_name(|key: Option<&str>| key.and_then(|k| k.strip_prefix("get-")).map(str::to_owned)),
  );
  register_impl1(&kernel, "first");
  register_impl2(&kernel, "second");

  let delegate = kernel.resolve_delegate::<dyn Common>(Some("get-second")).unwrap();
  assert_eq!(delegate.call().unwrap().id(), "impl2");
}

#[test]
fn test_loaders_are_consulted_in_order() {
  static CONSULTED: AtomicUsize = AtomicUsize::new(0);

  let kernel = Kernel::new();
  kernel.add_loader(|_: &Kernel, _: Option<&str>, _: &Contract| -> Result<Option<SyntheticRegistration>> {
    CONSULTED.fetch_add(1, Ordering::SeqCst);
    Ok(None)
  });
  kernel.add_loader(DelegateFactory::new());
  register_impl1(&kernel, "only");

  kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(CONSULTED.load(Ordering::SeqCst), 1);

  // The synthesized registration answers from now on.
  kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(CONSULTED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_loader_proposal_for_another_contract_is_skipped() {
  struct Other;

  let kernel = Kernel::new();
  kernel.add_loader(|_: &Kernel, _: Option<&str>, _: &Contract| -> Result<Option<SyntheticRegistration>> {
    Ok(Some(SyntheticRegistration::new(
      Component::<Other>::named("other").factory(|_| Ok(Arc::new(Other))),
    )))
  });
  kernel.add_loader(DelegateFactory::new());
  register_impl1(&kernel, "only");

  // The mismatched proposal is not registered; the next loader answers.
  let delegate = kernel.resolve_delegate::<dyn Common>(None).unwrap();
  assert_eq!(delegate.call().unwrap().id(), "impl1");
  assert!(kernel.lookup_by_name("other").is_none());

  // With nothing else to ask, the miss is reported for the request itself.
  let err = kernel.resolve_named::<dyn Common>("missing").err().unwrap();
  assert!(matches!(err, Error::ComponentNotFound { name: Some(ref n), .. } if n == "missing"));
  assert_eq!(kernel.get_assignable_handlers(&Contract::any()).len(), 2);
}
