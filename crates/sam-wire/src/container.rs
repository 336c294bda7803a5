//! Container trees — the content of a SAM message.
//!
//! A container is a named node holding an ordered list of items. Each
//! item is either a field (name → string value) or a nested container.
//! Fields and children live in separate namespaces: a field `status` and
//! a child `status` may coexist in the same node.

use crate::qname::QualifiedName;

/// A named string value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// One entry of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Field(Field),
    Child(Container),
}

/// A named, ordered node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Container {
    name: String,
    items: Vec<Item>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), items: Vec::new() }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an item as-is (duplicates allowed). Used by the decoder.
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    // ── Fields ───────────────────────────────────────────────────────

    /// Set a field, replacing the value of an existing field with the
    /// same name or appending a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.field_mut(&name) {
            Some(f) => f.value = value,
            None => self.items.push(Item::Field(Field { name, value })),
        }
        self
    }

    /// Builder-style `set`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields().find(|f| f.name == name).map(|f| f.value.as_str())
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Field(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    /// Remove the first field called `name`, returning its value.
    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        let idx = self
            .items
            .iter()
            .position(|item| matches!(item, Item::Field(f) if f.name == name))?;
        match self.items.remove(idx) {
            Item::Field(f) => Some(f.value),
            Item::Child(_) => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.items.iter().filter_map(|item| match item {
            Item::Field(f) => Some(f),
            Item::Child(_) => None,
        })
    }

    // ── Children ─────────────────────────────────────────────────────

    /// Append a child container and return a handle to it.
    pub fn add_child(&mut self, child: Container) -> &mut Container {
        self.items.push(Item::Child(child));
        match self.items.last_mut() {
            Some(Item::Child(c)) => c,
            _ => unreachable!("just pushed a child"),
        }
    }

    /// Builder-style `add_child`.
    pub fn with_child(mut self, child: Container) -> Self {
        self.items.push(Item::Child(child));
        self
    }

    pub fn child(&self, name: &str) -> Option<&Container> {
        self.children().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Container> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Child(c) if c.name == name => Some(c),
            _ => None,
        })
    }

    /// Existing child called `name`, or a freshly appended empty one.
    pub fn child_or_insert(&mut self, name: &str) -> &mut Container {
        let idx = self
            .items
            .iter()
            .position(|item| matches!(item, Item::Child(c) if c.name == name));
        let idx = match idx {
            Some(i) => i,
            None => {
                self.items.push(Item::Child(Container::new(name)));
                self.items.len() - 1
            }
        };
        match &mut self.items[idx] {
            Item::Child(c) => c,
            Item::Field(_) => unreachable!("index points at a child"),
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &Container> {
        self.items.iter().filter_map(|item| match item {
            Item::Child(c) => Some(c),
            Item::Field(_) => None,
        })
    }

    // ── Qualified-name lookup ────────────────────────────────────────

    /// Follow `path` through child containers.
    pub fn find_child<S: AsRef<str>>(&self, path: &[S]) -> Option<&Container> {
        path.iter().try_fold(self, |node, name| node.child(name.as_ref()))
    }

    /// Field at `qname`: all but the last component name children, the
    /// last names the field.
    pub fn get(&self, qname: &QualifiedName) -> Option<&str> {
        let leaf = qname.leaf()?;
        self.find_child(qname.parent())?.field(leaf)
    }

    /// Set the field at `qname`, creating intermediate children.
    ///
    /// Returns `false` (and changes nothing) for an empty name.
    pub fn set_at(&mut self, qname: &QualifiedName, value: impl Into<String>) -> bool {
        let Some(leaf) = qname.leaf() else {
            return false;
        };
        let mut node = self;
        for part in qname.parent() {
            node = node.child_or_insert(part);
        }
        node.set(leaf, value);
        true
    }

    /// Structural equality that ignores item order.
    ///
    /// Two containers are equivalent when they have the same name, the
    /// same multiset of fields, and children that can be paired off
    /// one-to-one as equivalent.
    pub fn equivalent(&self, other: &Container) -> bool {
        if self.name != other.name || self.items.len() != other.items.len() {
            return false;
        }
        let mut used = vec![false; other.items.len()];
        'outer: for item in &self.items {
            for (j, candidate) in other.items.iter().enumerate() {
                if used[j] {
                    continue;
                }
                let matched = match (item, candidate) {
                    (Item::Field(a), Item::Field(b)) => a == b,
                    (Item::Child(a), Item::Child(b)) => a.equivalent(b),
                    _ => false,
                };
                if matched {
                    used[j] = true;
                    continue 'outer;
                }
            }
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        let mut root = Container::new("status");
        root.set("host", "db01").set("uptime", "3600");
        let tables = root.add_child(Container::new("tables"));
        tables.add_child(Container::new("orders").with("rows", "12"));
        root
    }

    #[test]
    fn test_set_replaces() {
        let mut c = Container::new("x");
        c.set("a", "1").set("b", "2").set("a", "3");
        assert_eq!(c.field("a"), Some("3"));
        assert_eq!(c.fields().count(), 2);
    }

    #[test]
    fn test_field_and_child_share_name() {
        let mut c = Container::new("x");
        c.set("status", "ok");
        c.add_child(Container::new("status").with("detail", "fine"));
        assert_eq!(c.field("status"), Some("ok"));
        assert_eq!(c.child("status").and_then(|s| s.field("detail")), Some("fine"));
    }

    #[test]
    fn test_remove_field() {
        let mut c = sample();
        assert_eq!(c.remove_field("host"), Some("db01".to_string()));
        assert_eq!(c.remove_field("host"), None);
        assert_eq!(c.field("host"), None);
    }

    #[test]
    fn test_qualified_lookup() {
        let root = sample();
        let q: QualifiedName = "tables:orders:rows".parse().unwrap();
        assert_eq!(root.get(&q), Some("12"));
        let q: QualifiedName = "uptime".parse().unwrap();
        assert_eq!(root.get(&q), Some("3600"));
        let q: QualifiedName = "tables:missing:rows".parse().unwrap();
        assert_eq!(root.get(&q), None);
        assert!(root.find_child(&["tables", "orders"]).is_some());
        assert!(root.find_child::<&str>(&[]).is_some());
    }

    #[test]
    fn test_set_at_creates_path() {
        let mut root = Container::new("r");
        let q: QualifiedName = "a:b:c".parse().unwrap();
        assert!(root.set_at(&q, "v"));
        assert_eq!(root.get(&q), Some("v"));
        assert!(root.set_at(&q, "w"));
        assert_eq!(root.get(&q), Some("w"));
        assert_eq!(root.children().count(), 1);
        assert!(!root.set_at(&QualifiedName::new(), "x"));
    }

    #[test]
    fn test_equivalent_ignores_order() {
        let a = Container::new("m")
            .with("x", "1")
            .with("y", "2")
            .with_child(Container::new("c").with("k", "v"));
        let b = Container::new("m")
            .with_child(Container::new("c").with("k", "v"))
            .with("y", "2")
            .with("x", "1");
        assert!(a.equivalent(&b));
        assert_ne!(a, b);

        let c = Container::new("m").with("x", "1").with("y", "3");
        assert!(!a.equivalent(&c));
    }
}
