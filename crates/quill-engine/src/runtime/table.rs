// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Open-addressing hash table keyed by [`Value`].
//!
//! Capacity is always a power of two and probing is linear from
//! `hash & (capacity - 1)`. A vacant slot has an `Empty` key; its property
//! value tells the two vacancies apart:
//!
//! - `Null`: never used, probing stops here
//! - `Bool(true)`: tombstone left by a delete, probing continues past it
//!
//! Every entry remembers its hash, so growth never needs to look inside a key.
//! Ordinary keys hash by identity (strings are interned). The intern table
//! instead inserts with the content hash through [`Table::set_hashed`] and
//! looks strings up with [`Table::find_by_hash`].

use std::hash::Hasher;

use rustc_hash::FxHasher;

use super::value::{Value, fold_zero};

const MIN_CAPACITY: usize = 8;

/// How a property is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropKind {
    /// Plain data
    Value,
    /// A native or closure run on every read, with the receiver as `this`
    Function,
    /// An accessor object holding a getter and/or setter
    GetterSetter,
}

/// A table value together with its access kind.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub value: Value,
    pub kind: PropKind,
}

impl Property {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            kind: PropKind::Value,
        }
    }

    pub fn function(value: Value) -> Self {
        Self {
            value,
            kind: PropKind::Function,
        }
    }

    pub fn accessor(value: Value) -> Self {
        Self {
            value,
            kind: PropKind::GetterSetter,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    key: Value,
    hash: u32,
    prop: Property,
}

impl Entry {
    const VACANT: Entry = Entry {
        key: Value::Empty,
        hash: 0,
        prop: Property {
            value: Value::Null,
            kind: PropKind::Value,
        },
    };

    const TOMBSTONE: Entry = Entry {
        key: Value::Empty,
        hash: 0,
        prop: Property {
            value: Value::Bool(true),
            kind: PropKind::Value,
        },
    };

    fn is_vacant(&self) -> bool {
        self.key.is_empty()
    }

    fn is_tombstone(&self) -> bool {
        self.key.is_empty() && matches!(self.prop.value, Value::Bool(true))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
    /// Live entries plus tombstones; drives the load factor.
    used: usize,
    len: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Approximate heap footprint, used for GC accounting.
    pub fn byte_size(&self) -> usize {
        self.entries.len() * std::mem::size_of::<Entry>()
    }

    pub fn get(&self, key: Value) -> Option<Property> {
        self.get_hashed(key, hash_value(key))
    }

    pub fn get_value(&self, key: Value) -> Option<Value> {
        self.get(key).map(|prop| prop.value)
    }

    pub fn contains(&self, key: Value) -> bool {
        self.get(key).is_some()
    }

    fn get_hashed(&self, key: Value, hash: u32) -> Option<Property> {
        if self.len == 0 {
            return None;
        }
        let entry = &self.entries[find_slot(&self.entries, key, hash)];
        if entry.is_vacant() {
            None
        } else {
            Some(entry.prop)
        }
    }

    /// Insert or overwrite. Returns true when the key was not present.
    pub fn set(&mut self, key: Value, prop: Property) -> bool {
        self.set_hashed(key, hash_value(key), prop)
    }

    pub fn set_value(&mut self, key: Value, value: Value) -> bool {
        self.set(key, Property::value(value))
    }

    /// Insert with an explicit hash. Lookups for this key must use the same
    /// hash, so this is only for tables that never go through [`Table::get`].
    pub fn set_hashed(&mut self, key: Value, hash: u32, prop: Property) -> bool {
        debug_assert!(!key.is_empty(), "the empty sentinel cannot be a key");

        if (self.used + 1) * 4 > self.entries.len() * 3 {
            let capacity = (self.entries.len() * 2).max(MIN_CAPACITY);
            self.grow(capacity);
        }

        let index = find_slot(&self.entries, key, hash);
        let entry = &mut self.entries[index];
        let is_new = entry.is_vacant();
        if is_new {
            self.len += 1;
            // Reusing a tombstone does not change the load.
            if !entry.is_tombstone() {
                self.used += 1;
            }
        }
        *entry = Entry { key, hash, prop };
        is_new
    }

    /// Remove a key, leaving a tombstone. Returns true if it was present.
    pub fn delete(&mut self, key: Value) -> bool {
        if self.len == 0 {
            return false;
        }
        let index = find_slot(&self.entries, key, hash_value(key));
        if self.entries[index].is_vacant() {
            return false;
        }
        self.entries[index] = Entry::TOMBSTONE;
        self.len -= 1;
        true
    }

    /// Probe with `hash` and return the first key accepted by `is_match`.
    pub fn find_by_hash(&self, hash: u32, mut is_match: impl FnMut(Value) -> bool) -> Option<Value> {
        if self.len == 0 {
            return None;
        }
        let mask = self.entries.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let entry = &self.entries[index];
            if entry.is_vacant() {
                if !entry.is_tombstone() {
                    return None;
                }
            } else if entry.hash == hash && is_match(entry.key) {
                return Some(entry.key);
            }
            index = (index + 1) & mask;
        }
    }

    /// Tombstone every entry whose key is rejected. Returns the number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(Value) -> bool) -> usize {
        let mut removed = 0;
        for entry in self.entries.iter_mut() {
            if !entry.is_vacant() && !keep(entry.key) {
                *entry = Entry::TOMBSTONE;
                removed += 1;
            }
        }
        self.len -= removed;
        removed
    }

    /// Copy every entry of `self` into `other`, overwriting existing keys.
    pub fn copy_into(&self, other: &mut Table) {
        for entry in self.entries.iter().filter(|e| !e.is_vacant()) {
            other.set_hashed(entry.key, entry.hash, entry.prop);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Property)> + '_ {
        self.entries
            .iter()
            .filter(|e| !e.is_vacant())
            .map(|e| (e.key, e.prop))
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.iter().map(|(key, _)| key)
    }

    fn grow(&mut self, capacity: usize) {
        let old = std::mem::replace(&mut self.entries, vec![Entry::VACANT; capacity]);
        self.used = 0;
        for entry in old.into_iter().filter(|e| !e.is_vacant()) {
            let index = find_slot(&self.entries, entry.key, entry.hash);
            self.entries[index] = entry;
            self.used += 1;
        }
        // Tombstones are dropped by the rehash.
        debug_assert_eq!(self.used, self.len);
    }
}

/// Slot holding `key`, or the slot an insert of `key` should use.
fn find_slot(entries: &[Entry], key: Value, hash: u32) -> usize {
    let mask = entries.len() - 1;
    let mut index = hash as usize & mask;
    let mut tombstone = None;
    loop {
        let entry = &entries[index];
        if entry.is_vacant() {
            if entry.is_tombstone() {
                tombstone.get_or_insert(index);
            } else {
                return tombstone.unwrap_or(index);
            }
        } else if entry.hash == hash && entry.key.same_key(&key) {
            return index;
        }
        index = (index + 1) & mask;
    }
}

/// Identity hash of a value.
pub fn hash_value(value: Value) -> u32 {
    let mut hasher = FxHasher::default();
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Empty => hasher.write_u8(1),
        Value::Bool(b) => hasher.write_u8(2 + b as u8),
        Value::Number(n) => hasher.write_u64(fold_zero(n).to_bits()),
        Value::Obj(r) => {
            hasher.write_u8(4);
            hasher.write_u32(r.index());
        }
    }
    finish(hasher)
}

/// Content hash of string bytes, cached on every string object.
pub fn hash_str(s: &str) -> u32 {
    let mut hasher = FxHasher::default();
    hasher.write(s.as_bytes());
    hasher.write_u8(0xff);
    finish(hasher)
}

fn finish(hasher: FxHasher) -> u32 {
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_set_then_get() {
        let mut table = Table::new();
        assert!(table.set_value(num(1.0), num(10.0)));
        assert!(!table.set_value(num(1.0), num(11.0)));
        assert_eq!(table.get_value(num(1.0)), Some(num(11.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_value(num(2.0)), None);
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let mut table = Table::new();
        table.set_value(num(1.0), Value::Bool(true));
        table.set_value(num(2.0), Value::Bool(false));
        assert!(table.delete(num(1.0)));
        assert!(!table.delete(num(1.0)));
        assert_eq!(table.get(num(1.0)).map(|p| p.value), None);
        assert_eq!(table.get_value(num(2.0)), Some(Value::Bool(false)));
        assert_eq!(table.len(), 1);

        table.set_value(num(1.0), Value::Null);
        assert_eq!(table.get_value(num(1.0)), Some(Value::Null));
    }

    #[test]
    fn test_probe_continues_past_tombstone() {
        // Keys sharing a start slot force a probe chain.
        let mut table = Table::new();
        let hash = 3;
        let (a, b, c) = (num(1.0), num(2.0), num(3.0));
        table.set_hashed(a, hash, Property::value(a));
        table.set_hashed(b, hash, Property::value(b));
        table.set_hashed(c, hash, Property::value(c));

        let index = find_slot(&table.entries, a, hash);
        table.entries[index] = Entry::TOMBSTONE;
        table.len -= 1;

        assert_eq!(table.find_by_hash(hash, |k| k.same_key(&c)), Some(c));
        assert_eq!(table.find_by_hash(hash, |k| k.same_key(&a)), None);
    }

    #[test]
    fn test_growth_keeps_every_entry() {
        let mut table = Table::new();
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut keys = Vec::new();
        for _ in 0..1000 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let key = num((seed % 1_000_000) as f64);
            if !keys.iter().any(|k: &Value| k.same_key(&key)) {
                keys.push(key);
            }
            table.set_value(key, key);
        }

        assert_eq!(table.len(), keys.len());
        assert!(table.capacity().is_power_of_two());
        assert!(table.len() * 4 <= table.capacity() * 3);
        for key in &keys {
            assert_eq!(table.get_value(*key).map(|v| v.same_key(key)), Some(true));
        }
        assert_eq!(table.iter().count(), keys.len());
    }

    #[test]
    fn test_growth_drops_tombstones() {
        let mut table = Table::new();
        for i in 0..6 {
            table.set_value(num(i as f64), Value::Null);
        }
        for i in 0..5 {
            table.delete(num(i as f64));
        }
        for i in 10..40 {
            table.set_value(num(i as f64), Value::Null);
        }
        assert_eq!(table.len(), 31);
        assert!(table.contains(num(5.0)));
        assert!(!table.contains(num(0.0)));
    }

    #[test]
    fn test_retain_and_copy() {
        let mut table = Table::new();
        for i in 0..10 {
            table.set_value(num(i as f64), num(i as f64));
        }
        let removed = table.retain(|k| k.as_number().is_some_and(|n| n < 5.0));
        assert_eq!(removed, 5);
        assert_eq!(table.len(), 5);

        let mut other = Table::new();
        other.set_value(num(1.0), Value::Null);
        table.copy_into(&mut other);
        assert_eq!(other.len(), 5);
        assert_eq!(other.get_value(num(1.0)), Some(num(1.0)));
    }

    #[test]
    fn test_property_kinds() {
        let mut table = Table::new();
        table.set(Value::Bool(true), Property::function(Value::Null));
        let prop = table.get(Value::Bool(true)).unwrap();
        assert_eq!(prop.kind, PropKind::Function);
    }

    #[test]
    fn test_string_hash_is_content_based() {
        assert_eq!(hash_str("abc"), hash_str(&String::from("abc")));
        assert_ne!(hash_str("abc"), hash_str("abd"));
    }
}
