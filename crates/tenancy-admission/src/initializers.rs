//! Initializer set arithmetic
//!
//! Initializer lists are ordered on the wire but compared as sets. Merging
//! keeps the existing order and appends what is missing, so running it again
//! on its own output changes nothing.

use tenancy_common::crd::Initializer;

/// Ordered union of `current` and `required`
///
/// Every element of `current` is kept in place; each element of `required`
/// not already present is appended in `required` order.
pub fn merge_initializers(current: &[Initializer], required: &[Initializer]) -> Vec<Initializer> {
    let mut merged = current.to_vec();
    for initializer in required {
        if !merged.contains(initializer) {
            merged.push(initializer.clone());
        }
    }
    merged
}

/// Required initializers absent from `current`, in `required` order
pub fn missing_initializers<'a>(
    current: &[Initializer],
    required: &'a [Initializer],
) -> Vec<&'a Initializer> {
    required.iter().filter(|i| !current.contains(i)).collect()
}
