use crate::error::ProjectionError;
use std::any::{type_name, Any};
use std::collections::HashMap;

/// Named results collected from a facade's members
#[derive(Default)]
pub struct Slots {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<V: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: V,
    ) -> Result<(), ProjectionError> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(ProjectionError::Duplicate { slot: name });
        }
        self.values.insert(name, Box::new(value));
        Ok(())
    }

    pub(crate) fn insert_boxed(&mut self, name: String, value: Box<dyn Any + Send + Sync>) {
        self.values.insert(name, value);
    }

    /// Move the value out of `name`, which must hold exactly a `V`
    pub fn take<V: Any>(&mut self, name: &str) -> Result<V, ProjectionError> {
        self.take_with(name, |value: V| value)
    }

    /// Move the value out of `name`, converting it from the stored type `S`
    pub fn take_with<S, V, F>(&mut self, name: &str, convert: F) -> Result<V, ProjectionError>
    where
        S: Any,
        F: FnOnce(S) -> V,
    {
        let value = self
            .values
            .remove(name)
            .ok_or_else(|| ProjectionError::Missing {
                slot: name.to_string(),
            })?;

        match value.downcast::<S>() {
            Ok(value) => Ok(convert(*value)),
            Err(value) => {
                // Put it back so a second attempt with the right type still works
                self.values.insert(name.to_string(), value);
                Err(ProjectionError::TypeMismatch {
                    slot: name.to_string(),
                    expected: type_name::<S>(),
                })
            }
        }
    }

    /// Clone the value in `name` without removing it
    pub fn get<V: Any + Clone>(&self, name: &str) -> Result<V, ProjectionError> {
        let value = self.values.get(name).ok_or_else(|| ProjectionError::Missing {
            slot: name.to_string(),
        })?;

        (**value)
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| ProjectionError::TypeMismatch {
                slot: name.to_string(),
                expected: type_name::<V>(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds a facade result from its members' named results.
///
/// This is the static mapping a facade uses to project its slots onto one
/// typed value. Implementations should fail with [`ProjectionError::Missing`]
/// or [`ProjectionError::TypeMismatch`] when a required slot is absent or holds
/// an incompatible value.
pub trait FromSlots: Clone + Send + Sync + Sized + 'static {
    fn from_slots(slots: &mut Slots) -> Result<Self, ProjectionError>;
}
