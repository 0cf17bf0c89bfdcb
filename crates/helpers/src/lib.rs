use std::hash::BuildHasherDefault;

pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasherDefault<ahash::AHasher>>;
pub type IndexSet<V> = indexmap::IndexSet<V, BuildHasherDefault<ahash::AHasher>>;

/// Fluent in-place mutation, used throughout node/rule construction instead of
/// hand-written builder methods for every field.
pub trait Config: Sized {
    fn config(mut self, f: impl FnOnce(&mut Self)) -> Self {
        f(&mut self);
        self
    }
}

impl<T> Config for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Foo {
        a: i32,
        b: i32,
    }

    #[test]
    fn config_mutates_in_place() {
        let foo = Foo::default().config(|this| {
            this.a = 1;
            this.b = 2;
        });
        assert_eq!(foo.a, 1);
        assert_eq!(foo.b, 2);
    }

    #[test]
    fn index_map_preserves_insertion_order() {
        let mut m: IndexMap<&str, i32> = IndexMap::default();
        m.insert("z", 1);
        m.insert("a", 2);
        assert_eq!(m.keys().collect::<Vec<_>>(), vec![&"z", &"a"]);
    }
}
