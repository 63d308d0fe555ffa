//! Name-based keyword tagging for API functions.
//!
//! Classification is a case-insensitive substring test against four small
//! fixed lists. Both the specification analyzers and the checkers consult
//! this table; keeping it in one place avoids the two drifting apart.

/// Functions whose names begin with one of these take a variable number of
/// arguments; only return-value checks apply to them.
pub const VAR_ARG_KEYWORDS: &[&str] = &["print", "execl"];

/// Generic data-movement verbs that can appear on either side of a pairing.
pub const OTHER_KEYWORDS: &[&str] = &[
    "fetch", "insert", "push", "pop", "read", "write", "encode", "decode",
];

/// Allocator-like names: these usually demand a matching cleanup call.
pub const PRE_KEYWORDS: &[&str] = &[
    "alloc", "new", "clone", "create", "dup", "init", "open", "_lock",
];

/// Deallocator-like names: these usually follow a matching setup call.
pub const POST_KEYWORDS: &[&str] = &[
    "free", "release", "clear", "destroy", "clean", "close", "_unlock",
];

fn has_keyword(name: &str, keywords: &[&str]) -> bool {
    let lower = name.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

/// Does the name look like an allocator-style function?
pub fn is_pre(name: &str) -> bool {
    has_keyword(name, PRE_KEYWORDS)
}

/// Does the name look like a deallocator-style function?
pub fn is_post(name: &str) -> bool {
    has_keyword(name, POST_KEYWORDS)
}

/// Allocator-style or a generic data verb: plausible as a required
/// predecessor of some later call.
pub fn is_pre_seq(name: &str) -> bool {
    is_pre(name) || has_keyword(name, OTHER_KEYWORDS)
}

/// Deallocator-style or a generic data verb: plausible as a required
/// successor of some earlier call.
pub fn is_subsequent(name: &str) -> bool {
    is_post(name) || has_keyword(name, OTHER_KEYWORDS)
}

/// Variadic names are matched by prefix, not substring.
pub fn is_variadic(name: &str) -> bool {
    let bytes = name.as_bytes();
    VAR_ARG_KEYWORDS.iter().any(|k| {
        bytes.len() >= k.len() && bytes[..k.len()].eq_ignore_ascii_case(k.as_bytes())
    })
}
