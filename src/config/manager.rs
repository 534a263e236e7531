use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::loader;
use crate::config::value::{ConfigValue, INCLUDE};
use crate::error::ConfigError;

/// Stable handle for a registered config entry. Ids are list positions,
/// never reused: removal nullifies the slot instead of compacting.
pub type ConfigId = usize;

/// Priority band of a config layer, fixed at registration. Merging walks
/// entries in insertion order, so within one tier later entries win; the
/// tier exists so a merged baseline can be computed per band.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Tier {
    Default,
    User,
    System,
}

/// Which entries participate in [`ConfigManager::make_merged`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TierFilter {
    All,
    Only(Tier),
}

/// Callbacks fired after a manager mutation, outside the manager lock.
///
/// `diff` is the change the mutation made to the merged view, when there
/// was one. Implementations must not assume the manager state still
/// matches the event by the time they run.
pub trait ConfigChangeListener: Send + Sync {
    fn config_added(&self, id: ConfigId, diff: Option<&ConfigValue>) {
        let _ = (id, diff);
    }

    fn config_changed(&self, id: ConfigId, diff: Option<&ConfigValue>) {
        let _ = (id, diff);
    }

    fn config_removed(&self, id: ConfigId) {
        let _ = id;
    }

    fn configs_cleared(&self) {}
}

enum ChangeEvent {
    Added(ConfigId, Option<ConfigValue>),
    Changed(ConfigId, Option<ConfigValue>),
    Removed(ConfigId),
    Cleared,
}

struct Slots {
    // removal nullifies the value and clears the tier; ids stay stable
    // for the process lifetime
    entries: Vec<(ConfigValue, Option<Tier>)>,
}

impl Slots {
    // the document root is a map, so an empty selection merges to one
    fn merged(&self, filter: TierFilter) -> ConfigValue {
        let mut target = ConfigValue::map();
        for (config, tier) in &self.entries {
            if config.is_null() {
                continue;
            }
            let selected = match filter {
                TierFilter::All => true,
                TierFilter::Only(t) => *tier == Some(t),
            };
            if selected {
                ConfigManager::merge(&mut target, config);
            }
        }
        target
    }
}

/// Ordered stack of raw configuration layers with a derived merged view.
///
/// Mutations (add/set/remove/clear) recompute the merged view under an
/// exclusive lock; readers take lock-free snapshots of it. Listeners are
/// held as `Weak` handles so the manager never keeps a subscriber alive,
/// and stale handles are pruned on the next notification pass.
pub struct ConfigManager {
    slots: Mutex<Slots>,
    merged: ArcSwap<ConfigValue>,
    listeners: Mutex<Vec<Weak<dyn ConfigChangeListener>>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: Vec::new(),
            }),
            merged: ArcSwap::from_pointee(ConfigValue::map()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a config layer. Any `__include__` paths in the document
    /// are loaded first (tier Default, recursively), then the document
    /// itself is appended and the merged view updated.
    pub fn add(&self, config: ConfigValue, tier: Tier) -> Result<ConfigId, ConfigError> {
        let mut events = Vec::new();
        let result = {
            let mut slots = self.slots.lock();
            let mut chain = HashSet::new();
            self.add_value_locked(&mut slots, config, tier, None, &mut chain, &mut events)
        };
        self.publish(&events);
        result
    }

    /// Register a config file or directory. Directories expand to their
    /// `*.config` members in ascending name order (each at tier Default,
    /// like include expansion) and yield no id of their own.
    pub fn add_file(
        &self,
        path: impl AsRef<Path>,
        tier: Tier,
    ) -> Result<Option<ConfigId>, ConfigError> {
        let mut events = Vec::new();
        let result = {
            let mut slots = self.slots.lock();
            let mut chain = HashSet::new();
            self.add_path_locked(&mut slots, path.as_ref(), tier, &mut chain, &mut events)
        };
        self.publish(&events);
        result
    }

    /// Nullify the slot at `id`. The id is never reused.
    pub fn remove(&self, id: ConfigId) -> Result<(), ConfigError> {
        let event = {
            let mut slots = self.slots.lock();
            if id >= slots.entries.len() {
                return Err(ConfigError::InvalidId(id));
            }
            slots.entries[id] = (ConfigValue::Null, None);
            self.update_locked(&slots);
            ChangeEvent::Removed(id)
        };
        self.publish(std::slice::from_ref(&event));
        Ok(())
    }

    /// Replace the config stored at `id`, keeping its tier. The check is
    /// bounds-only: writing to a removed slot repopulates it, outside
    /// any tier band.
    pub fn set(&self, id: ConfigId, config: ConfigValue) -> Result<(), ConfigError> {
        let event = {
            let mut slots = self.slots.lock();
            let Some(entry) = slots.entries.get_mut(id) else {
                return Err(ConfigError::InvalidId(id));
            };
            entry.0 = config;
            let before = self.merged.load_full();
            self.update_locked(&slots);
            ChangeEvent::Changed(id, Self::diff(&before, &self.merged.load()))
        };
        self.publish(std::slice::from_ref(&event));
        Ok(())
    }

    /// The raw config stored at `id`; Null for a removed slot. The check
    /// is bounds-only.
    pub fn get(&self, id: ConfigId) -> Result<ConfigValue, ConfigError> {
        let slots = self.slots.lock();
        match slots.entries.get(id) {
            Some((config, _)) => Ok(config.clone()),
            None => Err(ConfigError::InvalidId(id)),
        }
    }

    /// Current effective view, as a cheap snapshot.
    pub fn get_merged(&self) -> Arc<ConfigValue> {
        self.merged.load_full()
    }

    /// Merge the selected entries, in insertion order, into a fresh value.
    pub fn make_merged(&self, filter: TierFilter) -> ConfigValue {
        self.slots.lock().merged(filter)
    }

    /// What higher layers changed on top of the `tier` baseline: the diff
    /// from `make_merged(Only(tier))` to the effective view.
    pub fn get_changes(&self, tier: Tier) -> Option<ConfigValue> {
        let slots = self.slots.lock();
        let baseline = slots.merged(TierFilter::Only(tier));
        Self::diff(&baseline, &self.merged.load())
    }

    /// Nullify every slot. Ids are never reused, so the list keeps its
    /// length.
    pub fn clear(&self) {
        {
            let mut slots = self.slots.lock();
            for entry in slots.entries.iter_mut() {
                *entry = (ConfigValue::Null, None);
            }
            self.update_locked(&slots);
        }
        self.publish(&[ChangeEvent::Cleared]);
    }

    pub fn add_listener(&self, listener: &Arc<dyn ConfigChangeListener>) {
        self.listeners.lock().push(Arc::downgrade(listener));
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConfigChangeListener>) {
        let target = Arc::as_ptr(listener);
        self.listeners
            .lock()
            .retain(|w| w.as_ptr() != target && w.strong_count() > 0);
    }

    // ---- internal ----

    fn update_locked(&self, slots: &Slots) {
        self.merged
            .store(Arc::new(slots.merged(TierFilter::All)));
    }

    fn add_value_locked(
        &self,
        slots: &mut Slots,
        config: ConfigValue,
        tier: Tier,
        origin: Option<&Path>,
        chain: &mut HashSet<PathBuf>,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<ConfigId, ConfigError> {
        if let Some(includes) = config.get(INCLUDE) {
            let origin_path =
                || origin.map_or_else(|| PathBuf::from("<inline>"), Path::to_path_buf);
            let Some(paths) = includes.as_array() else {
                return Err(ConfigError::InvalidInclude {
                    path: origin_path(),
                    reason: format!("{INCLUDE} must be an array of paths"),
                });
            };
            for entry in paths {
                let Some(path) = entry.as_str() else {
                    return Err(ConfigError::InvalidInclude {
                        path: origin_path(),
                        reason: format!("non-string entry in {INCLUDE}"),
                    });
                };
                self.add_path_locked(slots, Path::new(path), Tier::Default, chain, events)?;
            }
        }

        let before = self.merged.load_full();
        let id = slots.entries.len();
        slots.entries.push((config, Some(tier)));
        self.update_locked(slots);
        events.push(ChangeEvent::Added(
            id,
            Self::diff(&before, &self.merged.load()),
        ));
        Ok(id)
    }

    fn add_path_locked(
        &self,
        slots: &mut Slots,
        path: &Path,
        tier: Tier,
        chain: &mut HashSet<PathBuf>,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<Option<ConfigId>, ConfigError> {
        let canonical = path
            .canonicalize()
            .map_err(|_| ConfigError::FileNotFound {
                path: path.to_path_buf(),
            })?;
        // only paths on the active inclusion chain are cycle candidates;
        // a shared include reached along two branches is legitimate
        if !chain.insert(canonical.clone()) {
            return Err(ConfigError::IncludeCycle {
                path: path.to_path_buf(),
            });
        }
        let result = self.add_canonical_locked(slots, path, &canonical, tier, chain, events);
        chain.remove(&canonical);
        result
    }

    fn add_canonical_locked(
        &self,
        slots: &mut Slots,
        path: &Path,
        canonical: &Path,
        tier: Tier,
        chain: &mut HashSet<PathBuf>,
        events: &mut Vec<ChangeEvent>,
    ) -> Result<Option<ConfigId>, ConfigError> {
        if canonical.is_dir() {
            // NN-name.config ordering inside a config directory
            for member in loader::list_config_files(canonical)? {
                self.add_path_locked(slots, &member, Tier::Default, chain, events)?;
            }
            return Ok(None);
        }

        let config = loader::read_config_file(canonical)?;
        self.add_value_locked(slots, config, tier, Some(path), chain, events)
            .map(Some)
    }

    fn publish(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        let live: Vec<Arc<dyn ConfigChangeListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|w| w.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in &live {
            for event in events {
                match event {
                    ChangeEvent::Added(id, diff) => listener.config_added(*id, diff.as_ref()),
                    ChangeEvent::Changed(id, diff) => listener.config_changed(*id, diff.as_ref()),
                    ChangeEvent::Removed(id) => listener.config_removed(*id),
                    ChangeEvent::Cleared => listener.configs_cleared(),
                }
            }
        }
    }

    // ---- merge / diff / validation ----

    /// Recursively merge `source` into `target`.
    ///
    /// Null erases, the `"__default__"` sentinel is a no-op at any
    /// recursion depth, scalars replace, maps merge by key, arrays merge
    /// by position (growing the target with Null as needed).
    pub fn merge(target: &mut ConfigValue, source: &ConfigValue) {
        match source {
            ConfigValue::Null => *target = ConfigValue::Null,
            _ if source.is_default_sentinel() => {}
            ConfigValue::Map(members) => {
                if !matches!(target, ConfigValue::Map(_)) {
                    *target = ConfigValue::map();
                }
                let ConfigValue::Map(out) = target else {
                    unreachable!()
                };
                for (key, value) in members {
                    Self::merge(out.entry(key.clone()).or_insert(ConfigValue::Null), value);
                }
            }
            ConfigValue::Array(items) => {
                if !matches!(target, ConfigValue::Array(_)) {
                    *target = ConfigValue::Array(Vec::new());
                }
                let ConfigValue::Array(out) = target else {
                    unreachable!()
                };
                if out.len() < items.len() {
                    out.resize(items.len(), ConfigValue::Null);
                }
                for (i, value) in items.iter().enumerate() {
                    Self::merge(&mut out[i], value);
                }
            }
            _ => *target = source.clone(),
        }
    }

    /// Minimal config describing how `b` differs from `a`; `None` when
    /// they agree. Map diffs walk keys of `b` only (removals are not
    /// reported); array diffs emit the `"__default__"` sentinel for
    /// unchanged indices so positions are preserved.
    pub fn diff(a: &ConfigValue, b: &ConfigValue) -> Option<ConfigValue> {
        match (a, b) {
            (ConfigValue::Null, ConfigValue::Null) => None,
            (_, ConfigValue::Null) => Some(ConfigValue::Null),
            (ConfigValue::Null, _) => Some(b.clone()),
            _ if a.kind() != b.kind() => Some(b.clone()),
            (ConfigValue::Map(ma), ConfigValue::Map(mb)) => {
                let mut out = std::collections::BTreeMap::new();
                for (key, vb) in mb {
                    match ma.get(key) {
                        None => {
                            out.insert(key.clone(), vb.clone());
                        }
                        Some(va) => {
                            if let Some(d) = Self::diff(va, vb) {
                                out.insert(key.clone(), d);
                            }
                        }
                    }
                }
                (!out.is_empty()).then_some(ConfigValue::Map(out))
            }
            (ConfigValue::Array(aa), ConfigValue::Array(ab)) => {
                let mut out = Vec::with_capacity(ab.len());
                let mut changed = false;
                for (i, vb) in ab.iter().enumerate() {
                    let va = aa.get(i).unwrap_or(&ConfigValue::Null);
                    match Self::diff(va, vb) {
                        Some(d) => {
                            changed = true;
                            out.push(d);
                        }
                        None => out.push(ConfigValue::String(
                            crate::config::value::DEFAULT_VALUE.to_string(),
                        )),
                    }
                }
                changed.then_some(ConfigValue::Array(out))
            }
            _ => (a != b).then(|| b.clone()),
        }
    }

    /// Schema check. A null schema accepts anything; scalar schemas
    /// require an exact kind match; map schemas require every schema key
    /// present and valid; array schemas of length 0 accept any array,
    /// length 1 template-match every element, longer schemas are illegal.
    pub fn is_valid(config: &ConfigValue, schema: &ConfigValue) -> bool {
        if schema.is_null() {
            return true;
        }
        if config.is_null() || schema.kind() != config.kind() {
            return false;
        }
        match (schema, config) {
            (ConfigValue::Map(ms), ConfigValue::Map(mc)) => ms
                .iter()
                .all(|(key, vs)| mc.get(key).is_some_and(|vc| Self::is_valid(vc, vs))),
            (ConfigValue::Array(items), ConfigValue::Array(values)) => match items.len() {
                0 => true,
                1 => values.iter().all(|v| Self::is_valid(v, &items[0])),
                _ => {
                    tracing::warn!("[ConfigManager] array schema with multiple templates");
                    false
                }
            },
            _ => true,
        }
    }

    /// [`is_valid`](Self::is_valid) as a result.
    pub fn validate(config: &ConfigValue, schema: &ConfigValue) -> Result<(), ConfigError> {
        if Self::is_valid(config, schema) {
            Ok(())
        } else {
            Err(ConfigError::SchemaMismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::value::DEFAULT_VALUE;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    fn cv(v: serde_json::Value) -> ConfigValue {
        ConfigValue::from_json(&v)
    }

    #[test]
    fn layered_override() {
        let mgr = ConfigManager::new();
        mgr.add(cv(json!({"a": 1, "b": 2})), Tier::Default).unwrap();
        mgr.add(cv(json!({"b": 20, "c": 30})), Tier::User).unwrap();

        assert_eq!(*mgr.get_merged(), cv(json!({"a": 1, "b": 20, "c": 30})));
        assert_eq!(
            mgr.get_changes(Tier::Default),
            Some(cv(json!({"b": 20, "c": 30})))
        );
    }

    #[test]
    fn array_positional_merge() {
        let mgr = ConfigManager::new();
        mgr.add(cv(json!({"xs": [1, 2, 3]})), Tier::Default).unwrap();
        mgr.add(cv(json!({"xs": [DEFAULT_VALUE, 22, DEFAULT_VALUE]})), Tier::User)
            .unwrap();

        assert_eq!(*mgr.get_merged(), cv(json!({"xs": [1, 22, 3]})));
    }

    #[test]
    fn merged_view_tracks_make_merged_all() {
        let mgr = ConfigManager::new();
        let a = mgr.add(cv(json!({"x": {"y": 1}})), Tier::Default).unwrap();
        let b = mgr.add(cv(json!({"x": {"z": [true, null]}})), Tier::User).unwrap();
        mgr.set(a, cv(json!({"x": {"y": 7}, "w": "s"}))).unwrap();
        mgr.remove(b).unwrap();

        assert_eq!(*mgr.get_merged(), mgr.make_merged(TierFilter::All));
    }

    #[test]
    fn ids_are_bounds_checked_and_never_reused() {
        let mgr = ConfigManager::new();
        let a = mgr.add(cv(json!({"a": 1})), Tier::Default).unwrap();
        mgr.remove(a).unwrap();

        // get/set are bounds-only: a removed slot reads as Null and can
        // be silently repopulated
        assert_eq!(mgr.get(a).unwrap(), ConfigValue::Null);
        assert_eq!(*mgr.get_merged(), ConfigValue::map());
        mgr.set(a, cv(json!({"a": 2}))).unwrap();
        assert_eq!(mgr.get(a).unwrap(), cv(json!({"a": 2})));

        // the repopulated slot rejoins the effective view but belongs to
        // no tier band
        assert_eq!(*mgr.get_merged(), cv(json!({"a": 2})));
        assert_eq!(
            mgr.make_merged(TierFilter::Only(Tier::Default)),
            ConfigValue::map()
        );

        // out-of-range ids are the only invalid ones
        assert!(matches!(mgr.get(99), Err(ConfigError::InvalidId(99))));
        assert!(matches!(
            mgr.set(99, ConfigValue::Null),
            Err(ConfigError::InvalidId(99))
        ));

        // new entries never reuse the slot index
        let b = mgr.add(cv(json!({"b": 1})), Tier::Default).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn null_erases_in_merge() {
        let mgr = ConfigManager::new();
        mgr.add(cv(json!({"a": 1, "b": 2})), Tier::Default).unwrap();
        mgr.add(cv(json!({"b": null})), Tier::User).unwrap();

        assert_eq!(*mgr.get_merged(), cv(json!({"a": 1, "b": null})));
    }

    #[test]
    fn sentinel_is_noop_at_every_depth() {
        // top level
        let mut target = cv(json!({"a": 1}));
        ConfigManager::merge(&mut target, &ConfigValue::String(DEFAULT_VALUE.into()));
        assert_eq!(target, cv(json!({"a": 1})));

        // nested map position, not just array positions
        let mut target = cv(json!({"a": {"b": 1}, "c": 2}));
        ConfigManager::merge(
            &mut target,
            &cv(json!({"a": {"b": DEFAULT_VALUE}, "c": 3})),
        );
        assert_eq!(target, cv(json!({"a": {"b": 1}, "c": 3})));
    }

    #[test]
    fn diff_of_equal_is_none() {
        let x = cv(json!({"a": [1, {"b": 2}], "s": "t"}));
        assert_eq!(ConfigManager::diff(&x, &x), None);
    }

    #[test]
    fn diff_reports_type_changes_and_ignores_removals() {
        let a = cv(json!({"x": 1, "gone": true}));
        let b = cv(json!({"x": "1"}));
        assert_eq!(ConfigManager::diff(&a, &b), Some(cv(json!({"x": "1"}))));

        // integer width changes are type changes
        let a = ConfigValue::Int32(5);
        let b = ConfigValue::Int64(5);
        assert_eq!(ConfigManager::diff(&a, &b), Some(ConfigValue::Int64(5)));
    }

    #[test]
    fn diff_marks_unchanged_array_slots_with_sentinel() {
        let a = cv(json!({"xs": [1, 2, 3]}));
        let b = cv(json!({"xs": [1, 22, 3]}));
        assert_eq!(
            ConfigManager::diff(&a, &b),
            Some(cv(json!({"xs": [DEFAULT_VALUE, 22, DEFAULT_VALUE]})))
        );
    }

    #[test]
    fn merge_of_diff_recovers_target() {
        let a = cv(json!({"k": {"x": 1, "y": [1, 2]}, "only_a": true}));
        let b = cv(json!({"k": {"x": 2, "y": [1, 5], "z": "n"}, "only_a": false}));

        let d = ConfigManager::diff(&a, &b).unwrap();
        let mut restored = a.clone();
        ConfigManager::merge(&mut restored, &d);

        // equal on every key present in b
        let ConfigValue::Map(mb) = &b else { panic!() };
        for (key, vb) in mb {
            assert_eq!(restored.get(key), Some(vb));
        }
    }

    #[test]
    fn make_merged_is_deterministic() {
        let build = || {
            let mgr = ConfigManager::new();
            mgr.add(cv(json!({"a": [1, 2], "m": {"x": 1}})), Tier::Default)
                .unwrap();
            mgr.add(cv(json!({"m": {"y": 2}})), Tier::User).unwrap();
            serde_json::to_string(&mgr.get_merged().to_json()).unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn schema_validation() {
        let schema = cv(json!({"name": "", "count": 0, "tags": [""]}));

        assert!(ConfigManager::is_valid(
            &cv(json!({"name": "n", "count": 3, "tags": ["a", "b"], "extra": true})),
            &schema,
        ));
        // missing key
        assert!(!ConfigManager::is_valid(
            &cv(json!({"name": "n", "tags": []})),
            &schema,
        ));
        // scalar type mismatch
        assert!(!ConfigManager::is_valid(
            &cv(json!({"name": "n", "count": "3", "tags": []})),
            &schema,
        ));
        // element template mismatch
        assert!(!ConfigManager::is_valid(
            &cv(json!({"name": "n", "count": 3, "tags": [1]})),
            &schema,
        ));
        // empty array schema accepts any array
        assert!(ConfigManager::is_valid(
            &cv(json!([1, "x", null])),
            &cv(json!([])),
        ));
        // multi-element array schema is illegal
        assert!(!ConfigManager::is_valid(
            &cv(json!([1])),
            &cv(json!([0, 0])),
        ));
        // null schema accepts anything
        assert!(ConfigManager::is_valid(&cv(json!({"any": 1})), &ConfigValue::Null));
        assert!(ConfigManager::validate(&cv(json!(1)), &cv(json!(""))).is_err());
    }

    struct Recorder {
        log: PlMutex<Vec<String>>,
    }

    impl ConfigChangeListener for Recorder {
        fn config_added(&self, id: ConfigId, diff: Option<&ConfigValue>) {
            self.log
                .lock()
                .push(format!("added {id} {:?}", diff.map(|d| d.to_json().to_string())));
        }
        fn config_changed(&self, id: ConfigId, _diff: Option<&ConfigValue>) {
            self.log.lock().push(format!("changed {id}"));
        }
        fn config_removed(&self, id: ConfigId) {
            self.log.lock().push(format!("removed {id}"));
        }
        fn configs_cleared(&self) {
            self.log.lock().push("cleared".to_string());
        }
    }

    #[test]
    fn listeners_observe_mutations_with_diffs() {
        let mgr = ConfigManager::new();
        let recorder = Arc::new(Recorder {
            log: PlMutex::new(Vec::new()),
        });
        let listener: Arc<dyn ConfigChangeListener> = recorder.clone();
        mgr.add_listener(&listener);

        let id = mgr.add(cv(json!({"a": 1})), Tier::Default).unwrap();
        mgr.set(id, cv(json!({"a": 2}))).unwrap();
        mgr.remove(id).unwrap();
        mgr.clear();

        let log = recorder.log.lock();
        assert_eq!(
            log.as_slice(),
            &[
                format!("added {id} {:?}", Some(r#"{"a":1}"#.to_string())),
                format!("changed {id}"),
                format!("removed {id}"),
                "cleared".to_string(),
            ]
        );
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let mgr = ConfigManager::new();
        let listener: Arc<dyn ConfigChangeListener> = Arc::new(Recorder {
            log: PlMutex::new(Vec::new()),
        });
        mgr.add_listener(&listener);
        drop(listener);

        // must not panic or leak; stale weak is discarded on notify
        mgr.add(cv(json!({"a": 1})), Tier::Default).unwrap();
        assert!(mgr.listeners.lock().is_empty());
    }

    #[test]
    fn get_changes_empty_when_single_tier() {
        let mgr = ConfigManager::new();
        mgr.add(cv(json!({"a": 1})), Tier::Default).unwrap();
        assert_eq!(mgr.get_changes(Tier::Default), None);
    }
}
