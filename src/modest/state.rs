use ahash::AHashMap;
use parking_lot::Mutex;

/// A value stored in the kernel [`State`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateValue {
    Bool(bool),
    Int(i32),
    Str(String),
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        StateValue::Int(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Str(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Str(v)
    }
}

/// Process-wide named-value store shared by operation guards and state
/// mutators.
///
/// All access goes through [`read`](State::read) or [`write`](State::write),
/// which hold the exclusive lock for the duration of the closure. Guards
/// receive the read-only [`StateView`]; mutators receive [`StateMut`].
pub struct State {
    slots: Mutex<AHashMap<String, StateValue>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(AHashMap::new()),
        }
    }

    /// Run `f` against a coherent, immutable view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&StateView<'_>) -> R) -> R {
        let slots = self.slots.lock();
        f(&StateView { slots: &slots })
    }

    /// Run `f` with mutable access, under the exclusive lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut StateMut<'_>) -> R) -> R {
        let mut slots = self.slots.lock();
        f(&mut StateMut { slots: &mut slots })
    }
}

/// Read-only view of the [`State`], valid for the duration of a
/// [`State::read`] closure.
pub struct StateView<'a> {
    slots: &'a AHashMap<String, StateValue>,
}

impl StateView<'_> {
    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.slots.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.slots.get(name) {
            Some(StateValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.slots.get(name) {
            Some(StateValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.slots.get(name) {
            Some(StateValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}

/// Mutable view of the [`State`], valid for the duration of a
/// [`State::write`] closure.
pub struct StateMut<'a> {
    slots: &'a mut AHashMap<String, StateValue>,
}

impl StateMut<'_> {
    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.slots.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.slots.get(name) {
            Some(StateValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.slots.get(name) {
            Some(StateValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.slots.get(name) {
            Some(StateValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.slots.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<StateValue> {
        self.slots.remove(name)
    }
}
