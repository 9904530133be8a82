//! Cached sequence conversion.
//!
//! Rendering a list of items as a list of Docs should not rebuild the Doc of
//! an item that was already on screen. The converters here remember, per key,
//! the converted output of the previous version of the sequence.
//!
//! - [`View::map_seq_cached_by`] keeps a [`Var`] per key. A key seen again has
//!   its Var set to the new item, so the cached output updates in place
//!   through the View it was given, and `convert` is not called again.
//! - [`View::map_seq_cached`] uses the item itself as the key and hands
//!   `convert` a plain reference.
//!
//! Keys absent from a version are dropped from the cache. If a key occurs more
//! than once in the same version, only its first occurrence reuses the cached
//! entry; later occurrences are converted fresh.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{Var, View};

struct CachedItem<T, V> {
    var: Var<T>,
    value: V,
}

impl<T: Clone + 'static> View<Vec<T>> {
    /// Convert each item once per key, feeding later versions of the item
    /// through a per-key View.
    pub fn map_seq_cached_by<K, V>(
        &self,
        key: impl Fn(&T) -> K + 'static,
        convert: impl Fn(&K, View<T>) -> V + 'static,
    ) -> View<Vec<V>>
    where
        K: Hash + Eq + Clone + 'static,
        V: Clone + 'static,
    {
        let cache: RefCell<IndexMap<K, Rc<CachedItem<T, V>>>> = RefCell::new(IndexMap::new());
        self.map(move |items| {
            let mut previous = std::mem::take(&mut *cache.borrow_mut());
            let mut next = IndexMap::with_capacity(items.len());
            let mut out = Vec::with_capacity(items.len());

            for item in items {
                let k = key(&item);
                let node = match previous.swap_remove(&k) {
                    Some(node) => {
                        if let Err(error) = node.var.set(item) {
                            tracing::warn!(%error, "cached item rejected an update");
                        }
                        node
                    }
                    None => {
                        let var = Var::create(item);
                        let value = convert(&k, var.view());
                        Rc::new(CachedItem { var, value })
                    }
                };
                out.push(node.value.clone());
                next.entry(k).or_insert(node);
            }

            tracing::trace!(kept = next.len(), dropped = previous.len(), "sequence converted");
            *cache.borrow_mut() = next;
            out
        })
    }

    /// Convert each distinct item once, using the item as its own key.
    pub fn map_seq_cached<V>(&self, convert: impl Fn(&T) -> V + 'static) -> View<Vec<V>>
    where
        T: Hash + Eq,
        V: Clone + 'static,
    {
        let cache: RefCell<IndexMap<T, V>> = RefCell::new(IndexMap::new());
        self.map(move |items| {
            let mut previous = std::mem::take(&mut *cache.borrow_mut());
            let mut next = IndexMap::with_capacity(items.len());
            let mut out = Vec::with_capacity(items.len());

            for item in items {
                let value = match previous.swap_remove(&item) {
                    Some(value) => value,
                    None => convert(&item),
                };
                out.push(value.clone());
                next.entry(item).or_insert(value);
            }

            *cache.borrow_mut() = next;
            out
        })
    }
}
