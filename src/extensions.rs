use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
};

/// Type-keyed, request-scoped storage written by the authentication middlewares.
/// Each type holds at most one value, so an authenticated `Token` is simply
/// `params.get::<Token>()`.
#[derive(Default)]
pub struct Params {
    inner: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Params {
    /// Stores a value, replacing any earlier value of the same type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use starberry_auth::extensions::Params;
    ///
    /// let mut params = Params::default();
    /// params.set(42u32);
    /// assert_eq!(params.get::<u32>(), Some(&42));
    /// ```
    pub fn set<T: 'static + Send + Sync>(&mut self, value: T) {
        self.inner.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a reference to the stored value of type `T`, if any.
    pub fn get<T: 'static + Send + Sync>(&self) -> Option<&T> {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Returns a mutable reference to the stored value of type `T`, if any.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self) -> Option<&mut T> {
        self.inner
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Removes and returns the stored value of type `T`.
    pub fn take<T: 'static + Send + Sync>(&mut self) -> Option<T> {
        self.inner
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains<T: 'static + Send + Sync>(&self) -> bool {
        self.inner.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Params")
            .field("entries", &self.inner.len())
            .finish()
    }
}
