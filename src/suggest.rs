//! "Did you mean" suggestions for names that failed to resolve.

/// Closest candidate by normalized Levenshtein similarity, if any is
/// similar enough to be worth suggesting.
pub(crate) fn closest<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|candidate| (candidate, strsim::normalized_levenshtein(name, candidate)))
        .filter(|(_, score)| *score >= 0.6)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}
