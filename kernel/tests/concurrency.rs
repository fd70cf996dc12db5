use fibre_kernel::{Component, Contract, DelegateFactory, Kernel};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::thread;

// --- Test Fixtures ---

struct ExpensiveService;

// --- Concurrency Tests ---

#[test]
fn test_singleton_factory_is_called_only_once_under_concurrency() {
  static FACTORY_EXECUTION_COUNT: AtomicUsize = AtomicUsize::new(0);
  const THREADS: usize = 20;

  let kernel = Kernel::new();
  kernel
    .register(Component::<ExpensiveService>::named("expensive").factory(|_| {
      FACTORY_EXECUTION_COUNT.fetch_add(1, Ordering::SeqCst);
      // Widen the window in which other threads race for the cell.
      thread::sleep(std::time::Duration::from_millis(50));
      Ok(Arc::new(ExpensiveService))
    }))
    .unwrap();

  let resolved: Vec<Arc<ExpensiveService>> = thread::scope(|s| {
    let handles: Vec<_> = (0..THREADS)
      .map(|_| s.spawn(|| kernel.resolve::<ExpensiveService>().unwrap()))
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  assert_eq!(FACTORY_EXECUTION_COUNT.load(Ordering::SeqCst), 1);
  assert!(resolved.iter().all(|it| Arc::ptr_eq(it, &resolved[0])));
  assert_eq!(kernel.lookup_by_name("expensive").unwrap().references(), THREADS);
}

#[test]
fn test_concurrent_registration_and_resolution() {
  let kernel = Kernel::new();
  kernel
    .register(Component::<String>::named("common").instance(Arc::new("shared".to_string())))
    .unwrap();

  thread::scope(|s| {
    for i in 0..10usize {
      let kernel = kernel.clone();
      s.spawn(move || {
        kernel
          .register(Component::<usize>::named(format!("thread_service_{}", i)).instance(Arc::new(i)))
          .unwrap();

        for _ in 0..100 {
          assert_eq!(*kernel.resolve::<String>().unwrap(), "shared");
        }

        let mine = kernel.resolve_named::<usize>(&format!("thread_service_{}", i)).unwrap();
        assert_eq!(*mine, i);
      });
    }
  });

  assert_eq!(*kernel.resolve_named::<usize>("thread_service_5").unwrap(), 5);
  assert_eq!(kernel.lookup_by_contract(&Contract::of::<usize>()).len(), 10);
}

#[test]
fn test_concurrent_delegate_synthesis_registers_once() {
  let kernel = Kernel::new();
  kernel.add_loader(DelegateFactory::new());
  kernel
    .register(Component::<ExpensiveService>::named("expensive").transient().factory(|_| Ok(Arc::new(ExpensiveService))))
    .unwrap();

  thread::scope(|s| {
    for _ in 0..8 {
      s.spawn(|| {
        let delegate = kernel.resolve_delegate::<ExpensiveService>(None).unwrap();
        delegate.call().unwrap();
      });
    }
  });

  let synthetic = kernel
    .get_assignable_handlers(&Contract::any())
    .iter()
    .filter(|h| h.descriptor().is_synthetic())
    .count();
  assert_eq!(synthetic, 1);
}

#[test]
fn test_releasing_transients_from_many_threads() {
  static RELEASED: AtomicUsize = AtomicUsize::new(0);

  let kernel = Kernel::new();
  kernel
    .register(
      Component::<ExpensiveService>::named("worker")
        .transient()
        .factory(|_| Ok(Arc::new(ExpensiveService)))
        .on_release(|_| {
          RELEASED.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

  thread::scope(|s| {
    for _ in 0..8 {
      s.spawn(|| {
        for _ in 0..25 {
          let worker = kernel.resolve::<ExpensiveService>().unwrap();
          assert!(kernel.release(&worker));
        }
      });
    }
  });

  assert_eq!(RELEASED.load(Ordering::SeqCst), 200);
}
