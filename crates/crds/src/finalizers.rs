//! Finalizer list helpers
//!
//! Finalizers are an ordered set: a token appears at most once and adding or
//! removing one never reorders the others.

/// Whether `token` is present.
#[must_use]
pub fn has_finalizer(finalizers: &[String], token: &str) -> bool {
    finalizers.iter().any(|f| f == token)
}

/// `finalizers` with `token` appended if it was missing.
#[must_use]
pub fn with_finalizer(finalizers: &[String], token: &str) -> Vec<String> {
    let mut out = finalizers.to_vec();
    if !has_finalizer(finalizers, token) {
        out.push(token.to_string());
    }
    out
}

/// `finalizers` with every occurrence of `token` removed.
#[must_use]
pub fn without_finalizer(finalizers: &[String], token: &str) -> Vec<String> {
    finalizers.iter().filter(|f| *f != token).cloned().collect()
}
