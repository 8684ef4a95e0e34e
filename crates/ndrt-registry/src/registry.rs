use std::collections::HashMap;
use std::sync::OnceLock;

use ndrt_tensor::Tensor;
use parking_lot::Mutex;

use crate::{config::RegistryConfig, error::RegistryError};

/// Small integer key identifying a registered tensor.
///
/// Handles are never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Handle(u64);

impl Handle {
    /// Returns the raw handle value.
    pub fn id(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from a raw value received from the host.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a host caller receives for an operation result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exposed {
    /// A registered tensor.
    Handle(Handle),
    /// The value of a 0-d result, returned without registering it.
    Scalar(f32),
}

/// Outcome of [`HandleRegistry::teardown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Number of entries force-released.
    pub released: usize,
    /// Handles still registered afterwards, only non-empty in leak mode.
    pub outstanding: Vec<Handle>,
}

struct Table {
    entries: HashMap<Handle, Tensor>,
    next: u64,
}

/// Maps handles to live tensors behind one lock.
///
/// The registry holds one reference to each registered tensor. Views of it
/// taken through [`lookup`](Self::lookup) keep the buffer alive on their own,
/// so releasing a handle frees the buffer only when nothing else shares it.
///
/// Closures passed to [`with_tensor`](Self::with_tensor) and
/// [`with_tensor_mut`](Self::with_tensor_mut) run under the lock and must not
/// call back into the same registry.
pub struct HandleRegistry {
    config: RegistryConfig,
    table: Mutex<Table>,
}

static GLOBAL: OnceLock<HandleRegistry> = OnceLock::new();

impl HandleRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let entries = HashMap::with_capacity(config.initial_capacity);
        Self {
            config,
            table: Mutex::new(Table { entries, next: 1 }),
        }
    }

    /// Returns the process-wide registry, creating it from the environment on
    /// first use.
    pub fn global() -> &'static HandleRegistry {
        GLOBAL.get_or_init(|| HandleRegistry::new(RegistryConfig::from_env()))
    }

    /// Creates the process-wide registry with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyInitialized`] if the global registry
    /// already exists.
    pub fn init_global(config: RegistryConfig) -> Result<&'static HandleRegistry, RegistryError> {
        let mut created = false;
        let registry = GLOBAL.get_or_init(|| {
            created = true;
            HandleRegistry::new(config)
        });
        if !created {
            return Err(RegistryError::AlreadyInitialized);
        }
        log::debug!("global registry initialized");
        Ok(registry)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Stores `tensor` under a fresh handle.
    pub fn register(&self, tensor: Tensor) -> Handle {
        let mut table = self.table.lock();
        let handle = Handle(table.next);
        table.next += 1;
        log::trace!("register {} {:?} on {}", handle, tensor.shape(), tensor.device());
        table.entries.insert(handle, tensor);
        handle
    }

    /// Returns a tensor sharing the buffer registered under `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] for unknown or released
    /// handles.
    pub fn lookup(&self, handle: Handle) -> Result<Tensor, RegistryError> {
        self.with_tensor(handle, Tensor::clone)
    }

    /// Runs `f` on the registered tensor under the lock.
    ///
    /// Cursor state set through this method persists across calls.
    pub fn with_tensor<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&Tensor) -> R,
    ) -> Result<R, RegistryError> {
        let table = self.table.lock();
        let tensor = table
            .entries
            .get(&handle)
            .ok_or(RegistryError::InvalidHandle(handle))?;
        Ok(f(tensor))
    }

    /// Runs `f` on the registered tensor with mutable access under the lock.
    pub fn with_tensor_mut<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut Tensor) -> R,
    ) -> Result<R, RegistryError> {
        let mut table = self.table.lock();
        let tensor = table
            .entries
            .get_mut(&handle)
            .ok_or(RegistryError::InvalidHandle(handle))?;
        Ok(f(tensor))
    }

    /// Removes `handle` and releases the registry's reference.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] if the handle is unknown,
    /// including on a second release of the same handle.
    pub fn unregister(&self, handle: Handle) -> Result<(), RegistryError> {
        let removed = self.table.lock().entries.remove(&handle);
        match removed {
            Some(tensor) => {
                log::trace!("unregister {} (ref count {})", handle, tensor.ref_count());
                // the buffer may be freed here, outside the lock
                drop(tensor);
                Ok(())
            }
            None => {
                log::warn!("release of unknown handle {}", handle);
                Err(RegistryError::InvalidHandle(handle))
            }
        }
    }

    /// Registers a second handle for the tensor behind `handle`.
    pub fn alias(&self, handle: Handle) -> Result<Handle, RegistryError> {
        let tensor = self.lookup(handle)?;
        Ok(self.register(tensor))
    }

    /// Hands an operation result to the host.
    ///
    /// 0-d results are returned as a bare value and never registered.
    pub fn expose(&self, tensor: Tensor) -> Result<Exposed, RegistryError> {
        if tensor.is_scalar() {
            return Ok(Exposed::Scalar(tensor.item()?));
        }
        Ok(Exposed::Handle(self.register(tensor)))
    }

    /// Returns the ref count of the buffer behind `handle`.
    pub fn ref_count(&self, handle: Handle) -> Result<usize, RegistryError> {
        self.with_tensor(handle, Tensor::ref_count)
    }

    /// Returns the number of registered handles.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `handle` is registered.
    pub fn contains(&self, handle: Handle) -> bool {
        self.table.lock().entries.contains_key(&handle)
    }

    /// Returns the registered handles in creation order.
    pub fn outstanding(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.table.lock().entries.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Ends the session.
    ///
    /// Survivors are force-released, unless leak mode is configured, in which
    /// case they stay registered and are reported.
    pub fn teardown(&self) -> TeardownReport {
        if self.config.leak_on_teardown {
            let outstanding = self.outstanding();
            if !outstanding.is_empty() {
                log::warn!(
                    "leak mode: {} handles outstanding at teardown: {:?}",
                    outstanding.len(),
                    outstanding
                );
            }
            return TeardownReport {
                released: 0,
                outstanding,
            };
        }
        let drained: Vec<(Handle, Tensor)> = self.table.lock().entries.drain().collect();
        if !drained.is_empty() {
            log::debug!("teardown force-released {} handles", drained.len());
        }
        TeardownReport {
            released: drained.len(),
            outstanding: Vec::new(),
        }
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::Device;

    use super::*;

    fn registry() -> HandleRegistry {
        let _ = env_logger::builder().is_test(true).try_init();
        HandleRegistry::default()
    }

    #[test]
    fn register_lookup_unregister() -> Result<(), RegistryError> {
        let reg = registry();
        let h = reg.register(Tensor::ones(&[2, 2], Device::Cpu)?);
        assert!(reg.contains(h));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup(h)?.to_vec()?, vec![1.0; 4]);
        reg.unregister(h)?;
        assert!(reg.is_empty());
        assert_eq!(reg.lookup(h).err(), Some(RegistryError::InvalidHandle(h)));
        Ok(())
    }

    #[test]
    fn double_unregister_fails() -> Result<(), RegistryError> {
        let reg = registry();
        let h = reg.register(Tensor::zeros(&[3], Device::Cpu)?);
        reg.unregister(h)?;
        let err = reg.unregister(h);
        assert_eq!(err, Err(RegistryError::InvalidHandle(h)));
        assert!(err.err().is_some_and(|e| e.is_stale_handle()));
        Ok(())
    }

    #[test]
    fn handles_are_not_reused() -> Result<(), RegistryError> {
        let reg = registry();
        let a = reg.register(Tensor::zeros(&[1], Device::Cpu)?);
        reg.unregister(a)?;
        let b = reg.register(Tensor::zeros(&[1], Device::Cpu)?);
        assert_ne!(a, b);
        assert!(b > a);
        Ok(())
    }

    #[test]
    fn registry_reference_counts() -> Result<(), RegistryError> {
        let reg = registry();
        let t = Tensor::zeros(&[4], Device::Cpu)?;
        let h = reg.register(t.clone());
        assert_eq!(t.ref_count(), 2);
        let alias = reg.alias(h)?;
        assert_eq!(reg.ref_count(h)?, 3);
        reg.unregister(h)?;
        assert_eq!(t.ref_count(), 2);
        reg.unregister(alias)?;
        assert_eq!(t.ref_count(), 1);
        Ok(())
    }

    #[test]
    fn alias_shares_buffer() -> Result<(), RegistryError> {
        let reg = registry();
        let h = reg.register(Tensor::zeros(&[2], Device::Cpu)?);
        let alias = reg.alias(h)?;
        reg.with_tensor_mut(alias, |t| t.set(&[1], 5.0))??;
        assert_eq!(reg.lookup(h)?.to_vec()?, vec![0.0, 5.0]);
        Ok(())
    }

    #[test]
    fn cursor_persists_through_registry() -> Result<(), RegistryError> {
        let reg = registry();
        let h = reg.register(Tensor::from_vec(&[3, 2], vec![0.0; 6])?);
        reg.with_tensor(h, |t| {
            t.advance();
            t.advance();
        })?;
        assert_eq!(reg.with_tensor(h, Tensor::key)?, 2);
        // lookups hand out shared aliases with their own cursor
        assert_eq!(reg.lookup(h)?.key(), 0);
        Ok(())
    }

    #[test]
    fn expose_scalars_bare() -> Result<(), RegistryError> {
        let reg = registry();
        let s = reg.expose(Tensor::scalar(4.5, Device::Cpu)?)?;
        assert_eq!(s, Exposed::Scalar(4.5));
        assert!(reg.is_empty());
        let Exposed::Handle(h) = reg.expose(Tensor::zeros(&[1], Device::Cpu)?)? else {
            panic!("1-d results are registered");
        };
        assert!(reg.contains(h));
        Ok(())
    }

    #[test]
    fn teardown_releases_survivors() -> Result<(), RegistryError> {
        let reg = registry();
        let t = Tensor::zeros(&[2], Device::Cpu)?;
        reg.register(t.clone());
        reg.register(t.clone());
        let report = reg.teardown();
        assert_eq!(report.released, 2);
        assert!(report.outstanding.is_empty());
        assert_eq!(t.ref_count(), 1);
        Ok(())
    }

    #[test]
    fn teardown_in_leak_mode() -> Result<(), RegistryError> {
        let reg = HandleRegistry::new(RegistryConfig::new(4, true)?);
        let t = Tensor::zeros(&[2], Device::Cpu)?;
        let h = reg.register(t.clone());
        let report = reg.teardown();
        assert_eq!(report.released, 0);
        assert_eq!(report.outstanding, vec![h]);
        assert_eq!(t.ref_count(), 2);
        Ok(())
    }
}
