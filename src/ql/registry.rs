//! Uniquely named, order-preserving collections backing the types, constructors,
//! instructions and modifiers registries.

use std::sync::Arc;

use crate::error::{Error, Result};

/// Anything that can be stored inside a [`NamedRegistry`]
pub trait Named {
    fn name(&self) -> &str;
}

impl<T: Named + ?Sized> Named for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Named + ?Sized> Named for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Returns the object whose name is the most similar to `approximate_name`, the first one on ties
pub fn suggest<'a, T: Named + 'a>(
    objects: impl IntoIterator<Item = &'a T>,
    approximate_name: &str,
) -> Option<&'a T> {
    let mut best: Option<(&T, f64)> = None;
    for object in objects {
        let similarity = strsim::jaro_winkler(approximate_name, object.name());
        if best.is_none_or(|(_, max)| similarity > max) {
            best = Some((object, similarity));
        }
    }
    best.map(|(object, _)| object)
}

/// A collection of uniquely named objects
///
/// Lookups are exact. [`NamedRegistry::suggest`] is only used to build
/// "did you mean" hints and never to resolve a name.
#[derive(Debug, Clone)]
pub struct NamedRegistry<T: Named> {
    /// What the registry stores, used in error messages ("type", "instruction", ...)
    kind: &'static str,
    objects: Vec<T>,
}

impl<T: Named> NamedRegistry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            objects: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Adds an object, failing if its name is already taken. The registry is left unchanged on failure
    pub fn add(&mut self, object: T) -> Result<()> {
        if self.has(object.name()) {
            return Err(Error::DuplicateName {
                kind: self.kind.to_string(),
                name: object.name().to_string(),
            });
        }
        self.objects.push(object);
        Ok(())
    }

    /// Returns the object with exactly this name, if any
    pub fn find(&self, name: &str) -> Option<&T> {
        self.objects.iter().find(|o| o.name() == name)
    }

    /// Returns the object with exactly this name or a not found error with a suggestion
    pub fn get(&self, name: &str) -> Result<&T> {
        match self.find(name) {
            Some(object) => Ok(object),
            None => Err(self.not_found(name)),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut T> {
        match self.objects.iter().position(|o| o.name() == name) {
            Some(index) => Ok(&mut self.objects[index]),
            None => Err(self.not_found(name)),
        }
    }

    /// Like [`NamedRegistry::get`], with the caller's description of the miss
    pub fn get_or_throw(&self, name: &str, message: &str) -> Result<&T> {
        match self.find(name) {
            Some(object) => Ok(object),
            None => Err(match self.not_found(name) {
                Error::NotFound {
                    kind,
                    name,
                    suggestion,
                    ..
                } => Error::NotFound {
                    kind,
                    name,
                    suggestion,
                    message: Some(message.to_string()),
                },
                other => other,
            }),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn missing(&self, name: &str) -> bool {
        !self.has(name)
    }

    /// Returns the registered object whose name is the most similar to `approximate_name`.
    /// Ties go to the object registered first.
    pub fn suggest(&self, approximate_name: &str) -> Option<&T> {
        suggest(&self.objects, approximate_name)
    }

    /// Builds the not found error for `name`, including the closest registered name
    pub fn not_found(&self, name: &str) -> Error {
        Error::NotFound {
            kind: self.kind.to_string(),
            name: name.to_string(),
            suggestion: self.suggest(name).map(|o| o.name().to_string()),
            message: None,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.objects.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<'a, T: Named> IntoIterator for &'a NamedRegistry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{Named, NamedRegistry};
    use crate::error::{Error, Result};

    #[derive(Debug, PartialEq)]
    struct Setting(&'static str, u32);

    impl Named for Setting {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry() -> Result<NamedRegistry<Setting>> {
        let mut registry = NamedRegistry::new("option");
        registry.add(Setting("color", 1))?;
        registry.add(Setting("size", 2))?;
        Ok(registry)
    }

    #[test]
    fn test_add_and_get() -> Result<()> {
        let registry = registry()?;
        assert_eq!(registry.get("size")?, &Setting("size", 2));
        assert!(registry.has("color"));
        assert!(registry.missing("colour"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["color", "size"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_name() -> Result<()> {
        let mut registry = registry()?;
        assert_eq!(
            registry.add(Setting("color", 3)),
            Err(Error::DuplicateName {
                kind: "option".to_string(),
                name: "color".to_string()
            })
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("color")?, &Setting("color", 1));
        Ok(())
    }

    #[test]
    fn test_suggest() -> Result<()> {
        let registry = registry()?;
        assert_eq!(registry.suggest("clor").map(|o| o.name()), Some("color"));
        assert_eq!(registry.suggest("sise").map(|o| o.name()), Some("size"));
        assert!(NamedRegistry::<Setting>::new("option").suggest("x").is_none());
        Ok(())
    }

    #[test]
    fn test_suggest_ties_go_to_first_registered() -> Result<()> {
        let mut registry = NamedRegistry::new("option");
        registry.add(Setting("ab", 1))?;
        registry.add(Setting("ba", 2))?;
        registry.add(Setting("ab ", 3))?;
        assert_eq!(registry.suggest("zz").map(|o| o.1), Some(1));
        Ok(())
    }

    #[test]
    fn test_not_found_suggests() -> Result<()> {
        let registry = registry()?;
        assert_eq!(
            registry.get("clor"),
            Err(Error::NotFound {
                kind: "option".to_string(),
                name: "clor".to_string(),
                suggestion: Some("color".to_string()),
                message: None,
            })
        );
        assert_eq!(
            registry.get_or_throw("clor", "no clor here"),
            Err(Error::NotFound {
                kind: "option".to_string(),
                name: "clor".to_string(),
                suggestion: Some("color".to_string()),
                message: Some("no clor here".to_string()),
            })
        );
        assert_eq!(registry.get_or_throw("size", "no size here")?, &Setting("size", 2));
        Ok(())
    }
}
