//! Ordered, id-keyed registries of pluggable components.
//!
//! A [`Registry`] holds one capability (formatting or suggesting) as trait
//! objects. Built-ins are registered once when a [`Registries`] value is
//! constructed; persisted configuration then toggles, reorders and configures
//! them without touching the set of components.

pub mod formatter;
pub mod suggestor;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use tracing::{debug, warn};

pub use formatter::{FormatContext, Formatter};
pub use suggestor::{SuggestContext, Suggestion, Suggestor};

/// Free-form options stored alongside a registry entry.
pub type EntryOptions = toml::Table;

/// Builds a component from its current options.
pub type Factory<T> = Box<dyn Fn(&EntryOptions) -> Box<T> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already registered here or in the sibling registry.
    DuplicateId(String),
    UnknownId(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "Registry id '{id}' is already in use"),
            RegistryError::UnknownId(id) => write!(f, "No registry entry named '{id}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// The persisted form of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub options: EntryOptions,
}

fn default_true() -> bool {
    true
}

pub struct RegistryEntry<T: ?Sized> {
    id: String,
    enabled: bool,
    options: EntryOptions,
    default_enabled: bool,
    default_options: EntryOptions,
    registered_at: usize,
    factory: Factory<T>,
    component: Box<T>,
}

impl<T: ?Sized> RegistryEntry<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    pub fn component(&self) -> &T {
        &self.component
    }

    fn rebuild(&mut self) {
        self.component = (self.factory)(&self.options);
    }
}

impl<T: ?Sized> fmt::Debug for RegistryEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Entries kept in evaluation order; an entry's `order` is its index.
pub struct Registry<T: ?Sized> {
    entries: Vec<RegistryEntry<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.entries).finish()
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component. `factory` is called now and whenever the entry's
    /// options change. Outside this crate, registration goes through
    /// [`Registries`] so ids stay disjoint across both registries.
    pub(crate) fn register(
        &mut self,
        id: impl Into<String>,
        default_enabled: bool,
        default_options: EntryOptions,
        factory: Factory<T>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if self.contains(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        let component = factory(&default_options);
        let registered_at = self
            .entries
            .iter()
            .map(|e| e.registered_at + 1)
            .max()
            .unwrap_or(0);
        self.entries.push(RegistryEntry {
            id,
            enabled: default_enabled,
            options: default_options.clone(),
            default_enabled,
            default_options,
            registered_at,
            factory,
            component,
        });
        Ok(())
    }

    /// Drop a component, e.g. when a plugin goes away.
    pub(crate) fn unregister(&mut self, id: &str) -> Result<(), RegistryError> {
        let index = self.index_of(id)?;
        self.entries.remove(index);
        Ok(())
    }

    /// Every entry in evaluation order, enabled or not.
    pub fn get_all(&self) -> &[RegistryEntry<T>] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry<T>> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enabled components in order.
    pub fn enabled(&self) -> impl Iterator<Item = &T> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.component())
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        let index = self.index_of(id)?;
        self.entries[index].enabled = enabled;
        Ok(())
    }

    /// Replace an entry's options and rebuild its component.
    pub fn set_options(&mut self, id: &str, options: EntryOptions) -> Result<(), RegistryError> {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        entry.options = options;
        entry.rebuild();
        Ok(())
    }

    pub fn move_to(&mut self, id: &str, index: usize) -> Result<(), RegistryError> {
        let from = self.index_of(id)?;
        let entry = self.entries.remove(from);
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Apply persisted state. Unknown ids are ignored; entries missing from
    /// `persisted` keep their defaults and sort after the persisted ones.
    pub fn apply_persisted(&mut self, persisted: &[PersistedEntry]) {
        let mut keys: Vec<(usize, i64, usize)> = Vec::with_capacity(self.entries.len());
        for (builtin_index, entry) in self.entries.iter_mut().enumerate() {
            match persisted.iter().find(|p| p.id == entry.id) {
                Some(saved) => {
                    entry.enabled = saved.enabled;
                    let merged = merge_options(&entry.default_options, &saved.options);
                    if merged != entry.options {
                        entry.options = merged;
                        entry.rebuild();
                    }
                    keys.push((0, saved.order, builtin_index));
                }
                None => keys.push((1, 0, builtin_index)),
            }
        }
        for saved in persisted {
            if !self.entries.iter().any(|e| e.id == saved.id) {
                warn!(id = %saved.id, "ignoring unknown registry entry");
            }
        }

        let mut entries: Vec<_> = self.entries.drain(..).zip(keys).collect();
        entries.sort_by_key(|(_, key)| *key);
        self.entries = entries.into_iter().map(|(entry, _)| entry).collect();
    }

    pub fn to_persisted(&self) -> Vec<PersistedEntry> {
        self.entries
            .iter()
            .enumerate()
            .map(|(order, entry)| PersistedEntry {
                id: entry.id.clone(),
                enabled: entry.enabled,
                order: order as i64,
                options: entry.options.clone(),
            })
            .collect()
    }

    /// Restore registration order, enabled flags and options.
    pub fn reset_to_defaults(&mut self) {
        self.entries.sort_by_key(|entry| entry.registered_at);
        for entry in &mut self.entries {
            entry.enabled = entry.default_enabled;
            if entry.options != entry.default_options {
                entry.options = entry.default_options.clone();
                entry.rebuild();
            }
        }
        debug!(entries = self.entries.len(), "registry reset to defaults");
    }

    fn index_of(&self, id: &str) -> Result<usize, RegistryError> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))
    }
}

/// Mutable access to one registry of a [`Registries`] pair.
///
/// Entries can be toggled, configured, reordered and removed, but not added:
/// new ids must go through [`Registries::register_formatter`] or
/// [`Registries::register_suggestor`].
pub struct RegistryEditor<'a, T: ?Sized> {
    registry: &'a mut Registry<T>,
}

impl<'a, T: ?Sized> RegistryEditor<'a, T> {
    fn new(registry: &'a mut Registry<T>) -> Self {
        Self { registry }
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<(), RegistryError> {
        self.registry.set_enabled(id, enabled)
    }

    pub fn set_options(&mut self, id: &str, options: EntryOptions) -> Result<(), RegistryError> {
        self.registry.set_options(id, options)
    }

    pub fn move_to(&mut self, id: &str, index: usize) -> Result<(), RegistryError> {
        self.registry.move_to(id, index)
    }

    pub fn unregister(&mut self, id: &str) -> Result<(), RegistryError> {
        self.registry.unregister(id)
    }

    pub fn apply_persisted(&mut self, persisted: &[PersistedEntry]) {
        self.registry.apply_persisted(persisted);
    }

    pub fn reset_to_defaults(&mut self) {
        self.registry.reset_to_defaults();
    }
}

impl<T: ?Sized> Deref for RegistryEditor<'_, T> {
    type Target = Registry<T>;

    fn deref(&self) -> &Registry<T> {
        self.registry
    }
}

/// Saved options layered over the defaults so new option keys keep a value.
fn merge_options(defaults: &EntryOptions, saved: &EntryOptions) -> EntryOptions {
    let mut merged = defaults.clone();
    for (key, value) in saved {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub(crate) fn option_str<'a>(options: &'a EntryOptions, key: &str) -> Option<&'a str> {
    options.get(key).and_then(|value| value.as_str())
}

pub(crate) fn option_bool(options: &EntryOptions, key: &str, default: bool) -> bool {
    options
        .get(key)
        .and_then(|value| value.as_bool())
        .unwrap_or(default)
}

pub(crate) fn option_strings(options: &EntryOptions, key: &str) -> Vec<String> {
    match options.get(key) {
        Some(toml::Value::Array(values)) => values
            .iter()
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect(),
        Some(toml::Value::String(value)) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Both registries, with ids kept disjoint between them.
pub struct Registries {
    formatters: Registry<dyn Formatter>,
    suggestors: Registry<dyn Suggestor>,
}

impl fmt::Debug for Registries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("formatters", &self.formatters)
            .field("suggestors", &self.suggestors)
            .finish()
    }
}

impl Registries {
    pub fn empty() -> Self {
        Self {
            formatters: Registry::new(),
            suggestors: Registry::new(),
        }
    }

    /// Every built-in formatter and suggestor at its default settings.
    pub fn builtin() -> Self {
        let mut registries = Self::empty();
        for builtin in formatter::builtins() {
            let registered = registries.register_formatter(
                builtin.id,
                builtin.enabled,
                builtin.options,
                builtin.factory,
            );
            if let Err(err) = registered {
                warn!(error = %err, "built-in formatter not registered");
            }
        }
        for builtin in suggestor::builtins() {
            let registered = registries.register_suggestor(
                builtin.id,
                builtin.enabled,
                builtin.options,
                builtin.factory,
            );
            if let Err(err) = registered {
                warn!(error = %err, "built-in suggestor not registered");
            }
        }
        registries
    }

    pub fn register_formatter(
        &mut self,
        id: &str,
        enabled: bool,
        options: EntryOptions,
        factory: Factory<dyn Formatter>,
    ) -> Result<(), RegistryError> {
        if self.suggestors.contains(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        self.formatters.register(id, enabled, options, factory)
    }

    pub fn register_suggestor(
        &mut self,
        id: &str,
        enabled: bool,
        options: EntryOptions,
        factory: Factory<dyn Suggestor>,
    ) -> Result<(), RegistryError> {
        if self.formatters.contains(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        self.suggestors.register(id, enabled, options, factory)
    }

    pub fn formatters(&self) -> &Registry<dyn Formatter> {
        &self.formatters
    }

    pub fn formatters_mut(&mut self) -> RegistryEditor<'_, dyn Formatter> {
        RegistryEditor::new(&mut self.formatters)
    }

    pub fn suggestors(&self) -> &Registry<dyn Suggestor> {
        &self.suggestors
    }

    pub fn suggestors_mut(&mut self) -> RegistryEditor<'_, dyn Suggestor> {
        RegistryEditor::new(&mut self.suggestors)
    }
}

/// A built-in component as registered at startup.
pub struct Builtin<T: ?Sized> {
    pub id: &'static str,
    pub enabled: bool,
    pub options: EntryOptions,
    pub factory: Factory<T>,
}
