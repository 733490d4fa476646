//! Folding amendments over a base sample
//!
//! Resolution is pure: it never touches storage and never fails for
//! well-formed input, so it can run on any worker thread.
//!
//! Amendments are applied in `(created, content hash, domain)` order. The
//! secondary keys only matter for timestamp ties and make the result
//! independent of the order the amendments were supplied in.
//!
//! Per patch:
//! - addition inserts the post-image
//! - deletion removes the entry structurally equal to the pre-image
//! - replacement removes every entry sharing the pre-image's key (attribute
//!   type, reference url, relationship source and type), then inserts the
//!   post-image
//!
//! Each step has the form `(s \ removed) ∪ inserted`, so folding the same
//! sequence twice gives the same sample as folding it once.

use biosamples_common::types::{
    Amendment, Attribute, ExternalReference, Patch, Relationship, Sample,
};
use std::collections::BTreeSet;
use tracing::trace;

/// A resolved sample and the number of amendments that changed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub sample: Sample,
    pub changes: usize,
}

/// Resolve `base` against every amendment.
pub fn resolve(base: &Sample, amendments: &[Amendment]) -> Sample {
    resolve_with_changes(base, amendments, None).sample
}

/// Resolve `base` against the amendments owned by `domains`.
///
/// `None` applies every domain. An explicitly empty list applies nothing and
/// returns the base untouched.
pub fn resolve_for_domains(
    base: &Sample,
    amendments: &[Amendment],
    domains: Option<&[String]>,
) -> Sample {
    resolve_with_changes(base, amendments, domains).sample
}

pub fn resolve_with_changes(
    base: &Sample,
    amendments: &[Amendment],
    domains: Option<&[String]>,
) -> Resolution {
    if matches!(domains, Some(d) if d.is_empty()) {
        return Resolution {
            sample: base.clone(),
            changes: 0,
        };
    }

    let mut sample = base.clone();
    let mut reviewed = base.update;
    let mut changes = 0;

    for amendment in order_amendments(amendments) {
        if let Some(domains) = domains {
            if !domains.iter().any(|d| d == &amendment.domain) {
                continue;
            }
        }

        let changed = apply_patch(&mut sample, &amendment.patch);
        trace!(
            sample = %sample.identifier(),
            domain = %amendment.domain,
            operation = amendment.operation().as_str(),
            changed,
            "Applied amendment"
        );
        if changed {
            changes += 1;
        }
        reviewed = reviewed.max(amendment.created);
    }

    sample.reviewed = Some(reviewed);
    Resolution { sample, changes }
}

/// Sort amendments into application order.
pub fn order_amendments(amendments: &[Amendment]) -> Vec<&Amendment> {
    let mut ordered: Vec<&Amendment> = amendments.iter().collect();
    ordered.sort_by_cached_key(|a| (a.created, a.content_hash(), a.domain.clone()));
    ordered
}

/// Apply one patch in place, returning whether the sample changed.
pub fn apply_patch(sample: &mut Sample, patch: &Patch) -> bool {
    match patch {
        Patch::Attribute { pre, post } => apply_to_set(
            &mut sample.attributes,
            pre.as_ref(),
            post.as_ref(),
            |a: &Attribute, b: &Attribute| a.attribute_type == b.attribute_type,
        ),
        Patch::ExternalReference { pre, post } => apply_to_set(
            &mut sample.external_references,
            pre.as_ref(),
            post.as_ref(),
            |a: &ExternalReference, b: &ExternalReference| a.url == b.url,
        ),
        Patch::Relationship { pre, post } => apply_to_set(
            &mut sample.relationships,
            pre.as_ref(),
            post.as_ref(),
            |a: &Relationship, b: &Relationship| {
                a.source == b.source && a.relationship_type == b.relationship_type
            },
        ),
    }
}

/// A replacement (pre and post) clears every entry sharing the pre-image's
/// key, so a multi-valued key collapses to the post-image. A bare deletion
/// removes only the exact pre-image.
fn apply_to_set<T, F>(set: &mut BTreeSet<T>, pre: Option<&T>, post: Option<&T>, same_key: F) -> bool
where
    T: Ord + Clone,
    F: Fn(&T, &T) -> bool,
{
    match (pre, post) {
        (Some(pre), Some(post)) => {
            let before = set.len();
            set.retain(|e| e == post || !same_key(e, pre));
            let removed = set.len() != before;
            set.insert(post.clone()) || removed
        },
        (Some(pre), None) => set.remove(pre),
        (None, Some(post)) => set.insert(post.clone()),
        (None, None) => false,
    }
}
