//! Registry of state names, flags and aliases.
//!
//! A `StateSet` is built once at setup time and then handed to the store.
//! It maps declared state names to single-bit flags (in declaration order),
//! maps aliases to combinations of those bits, and resolves bit patterns
//! back to names.

use super::error::{StateError, StateResult};
use super::flags::Flags;
use std::collections::{BTreeMap, BTreeSet};

/// Name of the zero-valued default state unless configured otherwise.
pub const DEFAULT_STATE_NAME: &str = "NEW";

/// Reference to a state when declaring an alias: either by name or by flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateRef<'a> {
    Name(&'a str),
    Flags(Flags),
}

impl<'a> From<&'a str> for StateRef<'a> {
    fn from(name: &'a str) -> Self {
        StateRef::Name(name)
    }
}

impl<'a> From<&'a String> for StateRef<'a> {
    fn from(name: &'a String) -> Self {
        StateRef::Name(name.as_str())
    }
}

impl From<Flags> for StateRef<'_> {
    fn from(flags: Flags) -> Self {
        StateRef::Flags(flags)
    }
}

/// Alias name and constituent state names matching a bit pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMatch<'a> {
    pub alias: Option<&'a str>,
    pub states: Vec<&'a str>,
}

/// Registry of declared states and aliases.
///
/// The default state has value [`Flags::EMPTY`]. Each call to [`StateSet::add`]
/// takes the next free bit, so the first declared state is bit 0. Aliases name
/// combinations of two or more declared states.
///
/// With `check_alias` enabled (the default), every flag combination an item
/// may occupy must have a registered name. With it disabled, unnamed
/// combinations are accepted and get a synthetic name such as `_FOO__BAR`.
///
/// # Example
///
/// ```rust
/// use stateshelf::core::StateSet;
///
/// let mut states = StateSet::new();
/// let foo = states.add("foo").unwrap();
/// let bar = states.add("bar").unwrap();
/// let baz = states.add("baz").unwrap();
/// let xyzzy = states.alias("xyzzy", ["foo", "bar"]).unwrap();
///
/// assert_eq!(xyzzy, foo | bar);
/// assert_eq!(states.resolve(foo | bar).unwrap(), "XYZZY");
/// assert_eq!(states.next_flag(foo).unwrap(), bar);
/// assert!(states.next_flag(baz).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct StateSet {
    default_name: String,
    declared: Vec<String>,
    names: BTreeMap<String, Flags>,
    reverse: BTreeMap<Flags, String>,
    auto: BTreeSet<Flags>,
    check_alias: bool,
}

impl Default for StateSet {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSet {
    /// Create an empty set whose default state is `NEW`.
    pub fn new() -> Self {
        let mut names = BTreeMap::new();
        let mut reverse = BTreeMap::new();
        names.insert(DEFAULT_STATE_NAME.to_string(), Flags::EMPTY);
        reverse.insert(Flags::EMPTY, DEFAULT_STATE_NAME.to_string());
        Self {
            default_name: DEFAULT_STATE_NAME.to_string(),
            declared: Vec::new(),
            names,
            reverse,
            auto: BTreeSet::new(),
            check_alias: true,
        }
    }

    /// Create an empty set with a custom name for the default state.
    pub fn with_default_state(name: &str) -> StateResult<Self> {
        let name = canonical_name(name)?;
        let mut set = Self::new();
        set.names.clear();
        set.names.insert(name.clone(), Flags::EMPTY);
        set.reverse.insert(Flags::EMPTY, name.clone());
        set.default_name = name;
        Ok(set)
    }

    /// Enable or disable alias checking.
    pub fn check_alias(mut self, enabled: bool) -> Self {
        self.check_alias = enabled;
        self
    }

    pub fn checks_alias(&self) -> bool {
        self.check_alias
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Register a new state with the next free bit.
    pub fn add(&mut self, name: &str) -> StateResult<Flags> {
        let name = canonical_name(name)?;
        if self.names.contains_key(&name) {
            return Err(StateError::StateExists(name));
        }
        let index = self.declared.len() as u32;
        if index >= Flags::CAPACITY {
            return Err(StateError::CapacityExceeded {
                max: Flags::CAPACITY,
            });
        }
        let flag = Flags::bit(index);
        self.names.insert(name.clone(), flag);
        self.reverse.insert(flag, name.clone());
        self.declared.push(name);
        Ok(flag)
    }

    /// Register `name` as the OR of the referenced states.
    ///
    /// References may be state names, alias names or flag values. A `.` in
    /// the alias name is stored as `__`.
    pub fn alias<'r, I, R>(&mut self, name: &str, refs: I) -> StateResult<Flags>
    where
        I: IntoIterator<Item = R>,
        R: Into<StateRef<'r>>,
    {
        let name = canonical_name(name)?.replace('.', "__");
        if self.names.contains_key(&name) {
            return Err(StateError::StateExists(name));
        }

        let mut value = Flags::EMPTY;
        let mut unknown = Vec::new();
        for r in refs {
            match r.into() {
                StateRef::Name(n) => match self.lookup(n) {
                    Some(flags) => value |= flags,
                    None => unknown.push(n.to_string()),
                },
                StateRef::Flags(flags) => {
                    if flags.is_subset_of(self.declared_mask()) {
                        value |= flags;
                    } else {
                        unknown.push(flags.to_string());
                    }
                }
            }
        }

        if !unknown.is_empty() {
            return Err(StateError::InvalidAlias {
                name,
                reason: format!("unknown states: {}", unknown.join(", ")),
            });
        }
        if value.is_pure() {
            return Err(StateError::InvalidAlias {
                name,
                reason: "an alias must combine at least two states".to_string(),
            });
        }
        if let Some(existing) = self.reverse.get(&value) {
            if !self.auto.contains(&value) {
                return Err(StateError::StateExists(format!(
                    "{name} (combination already named {existing})"
                )));
            }
            let existing = existing.clone();
            self.names.remove(&existing);
            self.auto.remove(&value);
        }

        self.names.insert(name.clone(), value);
        self.reverse.insert(value, name);
        Ok(value)
    }

    /// Register an automatic alias for an unnamed combination.
    ///
    /// Only used when alias checking is disabled. Returns the synthetic name.
    pub fn register_auto(&mut self, flags: Flags) -> StateResult<String> {
        if let Some(name) = self.reverse.get(&flags) {
            return Ok(name.clone());
        }
        if self.check_alias {
            return Err(StateError::StateInvalid(format!(
                "unnamed state combination {flags}"
            )));
        }
        if flags.is_pure() || !flags.is_subset_of(self.declared_mask()) {
            return Err(StateError::StateInvalid(format!(
                "cannot name state combination {flags}"
            )));
        }
        let name = self.elements_name(flags);
        self.names.insert(name.clone(), flags);
        self.reverse.insert(flags, name.clone());
        self.auto.insert(flags);
        Ok(name)
    }

    /// Exact registered name for `flags`.
    pub fn resolve(&self, flags: Flags) -> StateResult<&str> {
        self.reverse
            .get(&flags)
            .map(String::as_str)
            .ok_or_else(|| StateError::StateInvalid(format!("no state named for {flags}")))
    }

    /// Name for `flags`, falling back to the synthetic element name when
    /// alias checking is disabled.
    pub fn name(&self, flags: Flags) -> StateResult<String> {
        match self.reverse.get(&flags) {
            Some(name) => Ok(name.clone()),
            None if !self.check_alias && flags.is_subset_of(self.declared_mask()) => {
                Ok(self.elements_name(flags))
            }
            None => Err(StateError::StateInvalid(format!(
                "no state named for {flags}"
            ))),
        }
    }

    /// Flags for a state, alias or synthetic element name.
    pub fn from_name(&self, name: &str) -> StateResult<Flags> {
        if let Some(flags) = self.lookup(name) {
            return Ok(flags);
        }
        if name.starts_with('_') {
            return self.from_elements(name);
        }
        Err(StateError::StateInvalid(name.to_string()))
    }

    /// Whether `flags` is usable as an item state under the current policy.
    pub fn validate(&self, flags: Flags) -> StateResult<()> {
        if self.reverse.contains_key(&flags) {
            return Ok(());
        }
        if !self.check_alias && flags.is_subset_of(self.declared_mask()) {
            return Ok(());
        }
        Err(StateError::StateInvalid(format!(
            "unknown state {flags}"
        )))
    }

    pub fn is_known(&self, flags: Flags) -> bool {
        self.reverse.contains_key(&flags)
    }

    /// Flags of the state declared after `flags`.
    ///
    /// From the default state this is the first declared state. Fails for
    /// aliases, unknown states and the last declared state.
    pub fn next_flag(&self, flags: Flags) -> StateResult<Flags> {
        if !flags.is_pure() {
            return Err(StateError::StateInvalid(format!(
                "cannot advance from alias state {flags}"
            )));
        }
        let next_index = if flags.is_empty() {
            0
        } else {
            let index = flags.value().trailing_zeros() as usize;
            if index >= self.declared.len() {
                return Err(StateError::StateInvalid(format!("unknown state {flags}")));
            }
            index + 1
        };
        if next_index >= self.declared.len() {
            return Err(StateError::StateInvalid(format!(
                "no state after {}",
                self.elements_name(flags)
            )));
        }
        Ok(Flags::bit(next_index as u32))
    }

    /// Names of the declared states making up `flags`, lowest bit first.
    pub fn elements(&self, flags: Flags) -> Vec<&str> {
        flags
            .bits()
            .filter_map(|bit| self.declared.get(bit.value().trailing_zeros() as usize))
            .map(String::as_str)
            .collect()
    }

    /// Synthetic name for `flags`: the default name for the empty state, the
    /// declared name for a single bit, `_A__B` for combinations.
    pub fn elements_name(&self, flags: Flags) -> String {
        let elements = self.elements(flags);
        match elements.as_slice() {
            [] => self.default_name.clone(),
            [single] => (*single).to_string(),
            many => format!("_{}", many.join("__")),
        }
    }

    /// Parse a synthetic element name back into flags.
    pub fn from_elements(&self, name: &str) -> StateResult<Flags> {
        let Some(body) = name.strip_prefix('_') else {
            return Err(StateError::StateInvalid(format!(
                "element name must start with '_': {name}"
            )));
        };
        let mut flags = Flags::EMPTY;
        for part in body.split("__") {
            match self.declared_flag(part) {
                Some(bit) => flags |= bit,
                None => return Err(StateError::StateInvalid(part.to_string())),
            }
        }
        Ok(flags)
    }

    /// Alias and atomic states matching `flags`.
    pub fn matches(&self, flags: Flags) -> StateMatch<'_> {
        let alias = if flags.is_pure() {
            None
        } else {
            self.reverse.get(&flags).map(String::as_str)
        };
        StateMatch {
            alias,
            states: self.elements(flags),
        }
    }

    /// All registered names in alphabetical order, including the default
    /// state and excluding automatic aliases.
    pub fn all(&self, pure_only: bool) -> Vec<&str> {
        self.names
            .iter()
            .filter(|(_, flags)| !self.auto.contains(flags))
            .filter(|(_, flags)| !pure_only || flags.is_pure())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every registered bit pattern (default, declared, aliases, automatic).
    pub fn known(&self) -> impl Iterator<Item = (Flags, &str)> {
        self.reverse.iter().map(|(flags, name)| (*flags, name.as_str()))
    }

    /// Declared state names in bit order.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Number of declared states.
    pub fn count(&self) -> usize {
        self.declared.len()
    }

    /// All declared bits set.
    pub fn declared_mask(&self) -> Flags {
        match self.declared.len() {
            0 => Flags::EMPTY,
            n if n as u32 >= Flags::CAPACITY => Flags::new(u64::MAX),
            n => Flags::new((1u64 << n) - 1),
        }
    }

    /// Declared bits not set in `flags`.
    pub fn mask(&self, flags: Flags) -> Flags {
        self.declared_mask().without(flags)
    }

    fn lookup(&self, name: &str) -> Option<Flags> {
        let name = canonical_name(name).ok()?;
        self.names.get(&name).copied()
    }

    fn declared_flag(&self, name: &str) -> Option<Flags> {
        let name = name.to_ascii_uppercase();
        self.declared
            .iter()
            .position(|n| *n == name)
            .map(|index| Flags::bit(index as u32))
    }
}

/// Validate a state name and return its canonical (uppercase) form.
pub fn canonical_name(name: &str) -> StateResult<String> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '_' || c == '.');
    if !valid {
        return Err(StateError::InvalidName(name.to_string()));
    }
    Ok(name.to_ascii_uppercase())
}
