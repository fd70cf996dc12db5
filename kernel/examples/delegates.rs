use fibre_kernel::{Component, Delegate, Dependency, Kernel, KernelConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
static OPEN_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

struct Connection {
  id: usize,
}

// A pool that opens a fresh connection per request.
struct Pool {
  connect: Arc<Delegate<Connection>>,
}

fn main() {
  let kernel = Kernel::from_config(&KernelConfig::default()).unwrap();

  kernel
    .register(
      Component::<Connection>::named("connection")
        .transient()
        .factory(|_| {
          let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
          OPEN_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
          println!("opening connection {}", id);
          Ok(Arc::new(Connection { id }))
        })
        .on_release(|conn| {
          println!("closing connection {}", conn.id);
          OPEN_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
  kernel
    .register(
      Component::<Pool>::named("pool")
        .depends_on(Dependency::deferred::<Connection>())
        .factory(|ctx| Ok(Arc::new(Pool { connect: ctx.delegate(0)? }))),
    )
    .unwrap();

  let pool = kernel.resolve::<Pool>().unwrap();
  for _ in 0..3 {
    let conn = pool.connect.call().unwrap();
    println!("used connection {}", conn.id);
  }

  // Every connection was released as soon as the delegate returned it.
  assert_eq!(OPEN_CONNECTIONS.load(Ordering::SeqCst), 0);

  for node in kernel.graph_nodes() {
    println!("{} -> eager {:?}, deferred {:?}", node.name, node.depends_on, node.deferred);
  }
}
