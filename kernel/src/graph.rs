//! Dependency graph inspection and cycle detection.

use crate::contract::Contract;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::registry::RegistryState;

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

/// One node per handler. Edges point at the handlers the requirements
/// currently select; forwarding aliases are followed, never represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraphNode {
  pub name: String,
  /// Edges constructed before the node itself.
  pub depends_on: Vec<String>,
  /// Edges satisfied through a delegate.
  pub deferred: Vec<String>,
}

pub(crate) fn graph_nodes(state: &RegistryState) -> Vec<DependencyGraphNode> {
  state
    .handlers()
    .iter()
    .map(|handler| {
      let mut node = DependencyGraphNode {
        name: handler.name().to_owned(),
        depends_on: Vec::new(),
        deferred: Vec::new(),
      };
      for dependency in handler.descriptor().requirements() {
        let Some(target) = edge_target(state, dependency.contract(), dependency.name()) else {
          continue;
        };
        if dependency.is_deferred() {
          node.deferred.push(target.name().to_owned());
        } else {
          node.depends_on.push(target.name().to_owned());
        }
      }
      node
    })
    .collect()
}

// A requirement on a callable contract points at the callable's target.
fn edge_target(state: &RegistryState, contract: &Contract, name: Option<&str>) -> Option<Arc<Handler>> {
  state.select(contract, name).or_else(|| {
    let callable = contract.callable()?;
    state.select(callable.returns(), name)
  })
}

/// Walks the eager requirements reachable from `root` and fails on the first
/// cycle, reporting the path from the repeated node back to itself.
///
/// Deferred requirements end the walk: the delegate they resolve to has no
/// eager edges of its own.
pub(crate) fn ensure_acyclic(state: &RegistryState, root: &Arc<Handler>, contract: &Contract) -> Result<()> {
  let mut path: Vec<Arc<Handler>> = Vec::new();
  let mut finished: HashSet<*const Handler> = HashSet::new();
  visit(state, root, &mut path, &mut finished).map_err(|cycle| {
    tracing::warn!(contract = contract.type_name(), path = ?cycle, "circular dependency detected");
    Error::CircularDependency {
      contract: contract.type_name().to_owned(),
      path: cycle,
    }
  })
}

fn visit(
  state: &RegistryState,
  handler: &Arc<Handler>,
  path: &mut Vec<Arc<Handler>>,
  finished: &mut HashSet<*const Handler>,
) -> std::result::Result<(), Vec<String>> {
  if finished.contains(&Arc::as_ptr(handler)) {
    return Ok(());
  }
  if let Some(start) = path.iter().position(|h| Arc::ptr_eq(h, handler)) {
    let mut cycle: Vec<String> = path[start..].iter().map(|h| h.name().to_owned()).collect();
    cycle.push(handler.name().to_owned());
    return Err(cycle);
  }

  path.push(handler.clone());
  for dependency in handler.descriptor().requirements() {
    if dependency.is_deferred() {
      continue;
    }
    if let Some(target) = state.select(dependency.contract(), dependency.name()) {
      visit(state, &target, path, finished)?;
    }
  }
  path.pop();
  finished.insert(Arc::as_ptr(handler));
  Ok(())
}

thread_local! {
  // The components currently being activated on this thread, outermost first.
  // Entries are tagged with the owning kernel so that independent kernels on
  // one thread never see each other's components.
  static RESOLVING_STACK: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// An RAII guard against re-entrant activation of one component.
///
/// This catches cycles the static walk cannot see, such as a factory that
/// resolves through the kernel handle it was given.
pub(crate) struct ResolutionGuard {
  kernel: usize,
}

impl ResolutionGuard {
  pub(crate) fn enter(kernel: usize, component: &str, contract: &Contract) -> Result<Self> {
    RESOLVING_STACK.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(start) = stack.iter().position(|(k, name)| *k == kernel && name == component) {
        let mut path: Vec<String> = stack[start..]
          .iter()
          .filter(|(k, _)| *k == kernel)
          .map(|(_, name)| name.clone())
          .collect();
        path.push(component.to_owned());
        tracing::warn!(contract = contract.type_name(), path = ?path, "circular dependency detected at activation");
        return Err(Error::CircularDependency {
          contract: contract.type_name().to_owned(),
          path,
        });
      }
      stack.push((kernel, component.to_owned()));
      Ok(Self { kernel })
    })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      let popped = stack.borrow_mut().pop();
      debug_assert!(matches!(popped, Some((k, _)) if k == self.kernel));
    });
  }
}
