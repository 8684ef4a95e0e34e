use std::rc::Rc;

use ndrt_tensor::Tensor;

use crate::{
    error::RegistryError,
    registry::{Handle, HandleRegistry},
};

struct Owner<'r> {
    registry: &'r HandleRegistry,
    handle: Handle,
}

impl Drop for Owner<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.unregister(self.handle) {
            log::error!("host object released {}: {}", self.handle, e);
        }
    }
}

/// A host-side object owning one registered handle.
///
/// Clones share the host-side count. When the last clone is dropped the
/// handle is unregistered. Two `HostRef`s adopting the same raw handle both
/// release it; the second release fails with
/// [`RegistryError::InvalidHandle`] and is logged instead of crashing.
#[derive(Clone)]
pub struct HostRef<'r> {
    owner: Rc<Owner<'r>>,
}

impl<'r> HostRef<'r> {
    /// Registers `tensor` and wraps the new handle.
    pub fn new(registry: &'r HandleRegistry, tensor: Tensor) -> Self {
        let handle = registry.register(tensor);
        Self {
            owner: Rc::new(Owner { registry, handle }),
        }
    }

    /// Takes ownership of an existing handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidHandle`] if `handle` is not registered.
    pub fn adopt(registry: &'r HandleRegistry, handle: Handle) -> Result<Self, RegistryError> {
        if !registry.contains(handle) {
            return Err(RegistryError::InvalidHandle(handle));
        }
        Ok(Self {
            owner: Rc::new(Owner { registry, handle }),
        })
    }

    /// Returns the wrapped handle.
    pub fn handle(&self) -> Handle {
        self.owner.handle
    }

    /// Returns the number of host-side clones sharing the handle.
    pub fn host_count(&self) -> usize {
        Rc::strong_count(&self.owner)
    }

    /// Returns a tensor sharing the registered buffer.
    pub fn tensor(&self) -> Result<Tensor, RegistryError> {
        self.owner.registry.lookup(self.owner.handle)
    }
}

impl std::fmt::Debug for HostRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRef")
            .field("handle", &self.owner.handle)
            .field("host_count", &self.host_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::Device;

    use super::*;

    #[test]
    fn last_clone_unregisters() -> Result<(), RegistryError> {
        let reg = HandleRegistry::default();
        let a = HostRef::new(&reg, Tensor::ones(&[2], Device::Cpu)?);
        let h = a.handle();
        let b = a.clone();
        assert_eq!(a.host_count(), 2);
        drop(a);
        assert!(reg.contains(h));
        assert_eq!(b.tensor()?.to_vec()?, vec![1.0, 1.0]);
        drop(b);
        assert!(!reg.contains(h));
        Ok(())
    }

    #[test]
    fn raw_copy_double_releases() -> Result<(), RegistryError> {
        let _ = env_logger::builder().is_test(true).try_init();
        let reg = HandleRegistry::default();
        let a = HostRef::new(&reg, Tensor::zeros(&[1], Device::Cpu)?);
        let b = HostRef::adopt(&reg, a.handle())?;
        let h = a.handle();
        drop(a);
        assert!(!reg.contains(h));
        assert_eq!(b.tensor().err(), Some(RegistryError::InvalidHandle(h)));
        // the second release is reported, not fatal
        drop(b);
        assert!(reg.is_empty());
        Ok(())
    }

    #[test]
    fn adopt_unknown_handle() {
        let reg = HandleRegistry::default();
        let h = Handle::from_raw(42);
        assert_eq!(
            HostRef::adopt(&reg, h).err(),
            Some(RegistryError::InvalidHandle(h))
        );
    }
}
