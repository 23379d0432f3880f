//! Key layout.
//!
//! Every component of a key, including the last, is terminated by `/`. A
//! prefix scan for `macvlan/network/n1/` therefore never matches `n10`.

/// Components every key is rooted under unless the store is built with another chain.
pub const DEFAULT_ROOT_CHAIN: &[&str] = &["vnd", "network", "v1.0"];

const SEPARATOR: char = '/';

/// Render a key from a root chain and the object's own components.
pub fn render<R, P>(root: &[R], parts: &[P]) -> String
where
    R: AsRef<str>,
    P: AsRef<str>,
{
    let mut key = String::new();
    for part in root
        .iter()
        .map(AsRef::as_ref)
        .chain(parts.iter().map(AsRef::as_ref))
    {
        key.push_str(part);
        key.push(SEPARATOR);
    }
    key
}

/// Render a key under [`DEFAULT_ROOT_CHAIN`], used for log lines when no store exists.
pub fn render_default<P: AsRef<str>>(parts: &[P]) -> String {
    render(DEFAULT_ROOT_CHAIN, parts)
}
