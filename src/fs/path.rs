//! Path component splitting for the content-addressed tree (spec.md
//! §4.5): there is no single serialized tree to index into, so every
//! lookup walks parent-to-child one directory ACB at a time.

/// Split `/a/b/c` into `["a", "b", "c"]`. A leading and/or trailing slash
/// is tolerated; empty components (from `//`) are dropped.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_and_drops_empty_components() {
        assert_eq!(components("/a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(components("a//b/"), vec!["a", "b"]);
        assert_eq!(components("/"), Vec::<&str>::new());
    }
}
