//! Fixed-size table of open device handles.

use crate::error::Error;

/// Index of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handle(u8);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct Registry<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> Registry<T, N> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Store `value` in the first free slot.
    pub fn open(&mut self, value: T) -> Result<Handle, Error> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            warn!("All {} handles in use", N);
            return Err(Error::Exhausted);
        };
        self.slots[index] = Some(value);
        Ok(Handle(index as u8))
    }

    pub fn close(&mut self, handle: Handle) -> Result<T, Error> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get(&self, handle: Handle) -> Result<&T, Error> {
        self.slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut T, Error> {
        self.slots
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_and_reuse() {
        let mut reg: Registry<u32, 2> = Registry::new();
        let a = reg.open(1).unwrap();
        let b = reg.open(2).unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.open(3), Err(Error::Exhausted));

        assert_eq!(reg.close(a), Ok(1));
        assert_eq!(reg.close(a), Err(Error::InvalidHandle));
        assert_eq!(reg.get(a), Err(Error::InvalidHandle));

        let c = reg.open(3).unwrap();
        assert_eq!(c, a);
        *reg.get_mut(c).unwrap() += 1;
        assert_eq!(reg.get(c), Ok(&4));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn foreign_handle_is_invalid() {
        let mut reg: Registry<u32, 1> = Registry::new();
        assert_eq!(reg.get_mut(Handle(5)), Err(Error::InvalidHandle));
        assert!(reg.is_empty());
    }
}
