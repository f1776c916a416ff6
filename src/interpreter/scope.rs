use indexmap::IndexMap;

use super::value::Value;

/// Index of a scope in the arena. Functions capture these instead of pointers
/// so the capture chain stays cycle-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub(crate) usize);

#[derive(Debug, Default)]
struct Scope {
    symbols: IndexMap<String, Value>,
    parent: Option<ScopeId>,
}

/// Arena of nested lexical scopes. Lookups walk the parent chain; writes and
/// removals act on the addressed scope only. `None` is the not-found
/// sentinel, never to be confused with a binding to the null value.
#[derive(Debug, Default)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            symbols: IndexMap::new(),
            parent,
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Look `name` up, walking the parent chain on miss.
    pub fn get(&self, id: ScopeId, name: &str) -> Option<Value> {
        let mut current = Some(id);
        while let Some(id) = current {
            let scope = &self.scopes[id.0];
            if let Some(value) = scope.symbols.get(name) {
                return Some(value.clone());
            }
            current = scope.parent;
        }
        None
    }

    /// Bind `name` in the addressed scope.
    pub fn set(&mut self, id: ScopeId, name: impl Into<String>, value: Value) {
        self.scopes[id.0].symbols.insert(name.into(), value);
    }

    /// Unbind `name` from the addressed scope only.
    pub fn remove(&mut self, id: ScopeId, name: &str) -> Option<Value> {
        self.scopes[id.0].symbols.shift_remove(name)
    }

    /// Merge a batch of bindings into the addressed scope.
    pub fn update(&mut self, id: ScopeId, bindings: impl IntoIterator<Item = (String, Value)>) {
        for (name, value) in bindings {
            self.set(id, name, value);
        }
    }

    /// The addressed scope's own bindings (parents excluded).
    pub fn snapshot(&self, id: ScopeId) -> IndexMap<String, Value> {
        self.scopes[id.0].symbols.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let mut scopes = Scopes::default();
        let outer = scopes.alloc(None);
        let inner = scopes.alloc(Some(outer));

        scopes.set(outer, "x", Value::int(1));
        assert!(scopes.get(inner, "x").unwrap().equals(&Value::int(1)));
        assert!(scopes.get(inner, "y").is_none());
    }

    #[test]
    fn test_set_shadows_in_current_scope() {
        let mut scopes = Scopes::default();
        let outer = scopes.alloc(None);
        let inner = scopes.alloc(Some(outer));

        scopes.set(outer, "x", Value::int(1));
        scopes.set(inner, "x", Value::int(2));

        assert!(scopes.get(inner, "x").unwrap().equals(&Value::int(2)));
        assert!(scopes.get(outer, "x").unwrap().equals(&Value::int(1)));
    }

    #[test]
    fn test_remove_is_local() {
        let mut scopes = Scopes::default();
        let outer = scopes.alloc(None);
        let inner = scopes.alloc(Some(outer));

        scopes.set(outer, "x", Value::int(1));
        assert!(scopes.remove(inner, "x").is_none());
        assert!(scopes.get(inner, "x").is_some());
    }

    #[test]
    fn test_null_binding_is_not_the_sentinel() {
        let mut scopes = Scopes::default();
        let scope = scopes.alloc(None);
        scopes.set(scope, "x", Value::null());

        assert!(scopes.get(scope, "x").is_some());
    }

    #[test]
    fn test_snapshot_excludes_parents() {
        let mut scopes = Scopes::default();
        let outer = scopes.alloc(None);
        let inner = scopes.alloc(Some(outer));
        scopes.set(outer, "x", Value::int(1));
        scopes.set(inner, "y", Value::int(2));

        let snapshot = scopes.snapshot(inner);
        assert!(snapshot.contains_key("y"));
        assert!(!snapshot.contains_key("x"));
    }
}
