//! The extension point consulted when no handler satisfies a request.

use crate::contract::Contract;
use crate::descriptor::SyntheticRegistration;
use crate::error::Result;
use crate::kernel::Kernel;

/// Proposes a registration on a resolution miss.
///
/// Loaders are asked in the order they were added. Returning `Ok(None)`
/// declines and lets the next loader try; a returned registration is
/// registered and resolved by the kernel immediately. A loader may query the
/// kernel but must not register, forward or unregister anything itself.
pub trait LazyComponentLoader: Send + Sync {
  fn try_load(
    &self,
    kernel: &Kernel,
    name: Option<&str>,
    contract: &Contract,
  ) -> Result<Option<SyntheticRegistration>>;
}

impl<F> LazyComponentLoader for F
where
  F: Fn(&Kernel, Option<&str>, &Contract) -> Result<Option<SyntheticRegistration>> + Send + Sync,
{
  fn try_load(
    &self,
    kernel: &Kernel,
    name: Option<&str>,
    contract: &Contract,
  ) -> Result<Option<SyntheticRegistration>> {
    self(kernel, name, contract)
  }
}
