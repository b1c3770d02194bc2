#[macro_export]
macro_rules! genealogy {
    ($e:expr) => {{
        use $crate::tree::from_newick;
        from_newick($e).unwrap().pop().unwrap()
    }};
}
