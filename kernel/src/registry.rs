//! The component registry and naming subsystem.
//!
//! Structural changes take the write lock; lookups share the read lock. The
//! registry never holds a lock while a component is being activated.

use crate::contract::Contract;
use crate::descriptor::ComponentDescriptor;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerState};
use crate::naming::NamingKey;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct ComponentRegistry {
  state: RwLock<RegistryState>,
}

#[derive(Default)]
pub(crate) struct RegistryState {
  // Registration order is the tie-break for every multi-candidate query.
  handlers: Vec<Arc<Handler>>,
  by_name: HashMap<String, Arc<Handler>>,
  by_contract: HashMap<Contract, Vec<Arc<Handler>>>,
  forwards: HashMap<String, String>,
  queries: HashMap<String, NamingKey>,
}

impl ComponentRegistry {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub(crate) fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
    self.state.read()
  }

  pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
    self.state.write()
  }

  /// Creates the handler and indexes it under every declared contract.
  pub(crate) fn register(self: &Arc<Self>, descriptor: ComponentDescriptor) -> Result<Arc<Handler>> {
    let handler = Arc::new(Handler::new(descriptor, Arc::downgrade(self)));
    self.write().insert(handler.clone())?;
    Ok(handler)
  }
}

impl RegistryState {
  fn name_taken(&self, name: &str) -> bool {
    self.by_name.contains_key(name) || self.forwards.contains_key(name) || self.queries.contains_key(name)
  }

  fn insert(&mut self, handler: Arc<Handler>) -> Result<()> {
    let name = handler.name().to_owned();
    if self.name_taken(&name) {
      return Err(Error::DuplicateName { name });
    }
    for contract in handler.descriptor().services() {
      let entry = self.by_contract.entry(contract.clone()).or_default();
      if !entry.iter().any(|h| Arc::ptr_eq(h, &handler)) {
        entry.push(handler.clone());
      }
    }
    self.by_name.insert(name, handler.clone());
    self.handlers.push(handler);
    Ok(())
  }

  pub(crate) fn remove(&mut self, name: &str) -> Option<Arc<Handler>> {
    let handler = self.by_name.remove(name)?;
    self.handlers.retain(|h| !Arc::ptr_eq(h, &handler));
    self.by_contract.retain(|_, handlers| {
      handlers.retain(|h| !Arc::ptr_eq(h, &handler));
      !handlers.is_empty()
    });
    self.forwards.retain(|_, target| target.as_str() != name);
    Some(handler)
  }

  pub(crate) fn add_forward(&mut self, alias: String, target: String) -> Result<()> {
    if self.name_taken(&alias) {
      return Err(Error::DuplicateName { name: alias });
    }
    self.forwards.insert(alias, target);
    Ok(())
  }

  pub(crate) fn add_query(&mut self, alias: String, key: NamingKey) -> Result<()> {
    if self.name_taken(&alias) {
      return Err(Error::DuplicateName { name: alias });
    }
    self.queries.insert(alias, key);
    Ok(())
  }

  pub(crate) fn handlers(&self) -> &[Arc<Handler>] {
    &self.handlers
  }

  // Follows forwarding aliases; `None` when they loop.
  fn redirect<'a>(&'a self, name: &'a str) -> Option<&'a str> {
    let mut current = name;
    let mut seen = HashSet::new();
    while let Some(target) = self.forwards.get(current) {
      if !seen.insert(current) {
        return None;
      }
      current = target;
    }
    Some(current)
  }

  /// Exact name lookup. Forwarding aliases redirect transparently.
  pub(crate) fn lookup_by_name(&self, name: &str) -> Option<Arc<Handler>> {
    let name = self.redirect(name)?;
    self.by_name.get(name).cloned()
  }

  /// Handlers indexed under `contract`, in registration order.
  pub(crate) fn lookup_by_contract(&self, contract: &Contract) -> Vec<Arc<Handler>> {
    self.by_contract.get(contract).cloned().unwrap_or_default()
  }

  /// Handlers whose service contracts are assignable to `contract`.
  pub(crate) fn assignable(&self, contract: &Contract) -> Vec<Arc<Handler>> {
    if contract.is_any() {
      return self.handlers.clone();
    }
    self.lookup_by_contract(contract)
  }

  /// First-registered handler whose bare name matches a bare key, or the
  /// handler with exactly the same property set for a compound key.
  pub(crate) fn resolve_query(&self, key: &NamingKey) -> Option<Arc<Handler>> {
    self.find_query(key, |_| true)
  }

  fn find_query(&self, key: &NamingKey, accept: impl Fn(&Handler) -> bool) -> Option<Arc<Handler>> {
    self
      .handlers
      .iter()
      .find(|handler| {
        handler.naming_key().is_some_and(|registered| key.matches(registered)) && accept(&***handler)
      })
      .cloned()
  }

  /// Resolves a requested name: forwarding aliases, then configured queries,
  /// then the compound-name grammar. Names outside the grammar fall back to
  /// exact lookup.
  pub(crate) fn resolve_name(&self, name: &str) -> Option<Arc<Handler>> {
    self.resolve_name_for(name, |_| true)
  }

  fn resolve_name_for(&self, name: &str, accept: impl Fn(&Handler) -> bool) -> Option<Arc<Handler>> {
    let name = self.redirect(name)?;
    if let Some(key) = self.queries.get(name) {
      return self.find_query(key, accept);
    }
    match NamingKey::parse(name) {
      Ok(key) => self
        .find_query(&key, &accept)
        .or_else(|| self.by_name.get(name).filter(|h| accept(&***h)).cloned()),
      Err(_) => self.by_name.get(name).filter(|h| accept(&***h)).cloned(),
    }
  }

  /// Picks the handler a request should be served by.
  ///
  /// Named requests go through the naming subsystem and must be assignable
  /// to `contract`. Unnamed requests take the first handler whose
  /// dependencies are satisfiable, falling back to the first registered so
  /// that its missing dependency is what gets reported.
  pub(crate) fn select(&self, contract: &Contract, name: Option<&str>) -> Option<Arc<Handler>> {
    match name {
      Some(name) => self.resolve_name_for(name, |handler| handler.is_assignable_to(contract)),
      None => {
        let handlers = self.assignable(contract);
        handlers
          .iter()
          .find(|handler| self.state_of(handler) == HandlerState::Valid)
          .or_else(|| handlers.first())
          .cloned()
      }
    }
  }

  /// All handlers that are valid candidates for an unnamed request.
  pub(crate) fn valid_candidates(&self, contract: &Contract) -> Vec<Arc<Handler>> {
    self
      .assignable(contract)
      .into_iter()
      .filter(|handler| self.state_of(handler) == HandlerState::Valid)
      .collect()
  }

  fn has_candidate(&self, contract: &Contract, name: Option<&str>) -> bool {
    let direct = match name {
      Some(name) => self
        .resolve_name_for(name, |handler| handler.is_assignable_to(contract))
        .is_some(),
      None => !self.assignable(contract).is_empty(),
    };
    if direct {
      return true;
    }
    // Callable contracts are synthesized on demand once a target exists;
    // without one the delegate factory cannot nominate anything.
    contract
      .callable()
      .filter(|callable| callable.has_return())
      .is_some_and(|callable| !self.assignable(callable.returns()).is_empty())
  }

  /// A handler is valid when each requirement has at least one candidate.
  pub(crate) fn state_of(&self, handler: &Handler) -> HandlerState {
    let satisfied = handler
      .descriptor()
      .requirements()
      .iter()
      .all(|dependency| self.has_candidate(dependency.contract(), dependency.name()));
    if satisfied {
      HandlerState::Valid
    } else {
      HandlerState::WaitingDependency
    }
  }
}
