//! Following references between documents through a loader.
//!
//! Documents point at each other in two directions. A forward reference is a
//! field holding another document's identifier (or an array of them). A
//! reverse link is expressed as a jsonpath predicate that finds the documents
//! pointing back at this one, with the `$uuid` placeholder filled from the
//! current document.
//!
//! Every helper registers all of its lookups before awaiting any of them, so
//! the lookups of one call (and of sibling calls issued in the same tick)
//! share a round trip.

use docbatch_core::{Document, Error, Outcome, TypeError};
use docbatch_loader::{BatchLoader, Store, Vars};
use futures::future::join_all;
use regex::Regex;
use std::sync::OnceLock;

/// Fetch the document whose identifier is stored in `doc[field]`.
///
/// Resolves to `None` when the field holds no reference: missing, null,
/// `""`, `false` or `0`. Any other non-string value is a type error.
pub async fn resolve_ref<S: Store>(
    loader: &BatchLoader<'_, S>,
    doc: &Document,
    field: &str,
) -> Outcome<Option<Document>, Error> {
    match doc.get(field) {
        None | Some(Document::Null | Document::Bool(false)) => Outcome::Ok(None),
        Some(Document::Number(n)) if n.as_f64().is_some_and(|v| v.abs() < f64::EPSILON) => {
            Outcome::Ok(None)
        }
        Some(Document::String(id)) if id.is_empty() => Outcome::Ok(None),
        Some(Document::String(id)) => loader.fetch_by_id(id).await,
        Some(other) => Outcome::Err(reference_type_error("identifier string", other, field)),
    }
}

/// Fetch every document listed in the array at `doc[field]`, in order.
///
/// Resolves to `None` when the field is missing or null. Identifiers with no
/// stored document come back as `None` entries.
pub async fn resolve_ref_list<S: Store>(
    loader: &BatchLoader<'_, S>,
    doc: &Document,
    field: &str,
) -> Outcome<Option<Vec<Option<Document>>>, Error> {
    let items = match doc.get(field) {
        None | Some(Document::Null) => return Outcome::Ok(None),
        Some(Document::Array(items)) => items,
        Some(other) => {
            return Outcome::Err(reference_type_error("array of identifiers", other, field));
        }
    };

    let mut lookups = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Document::String(id) => lookups.push(loader.fetch_by_id(id)),
            other => return Outcome::Err(reference_type_error("identifier string", other, field)),
        }
    }

    match collect(join_all(lookups).await) {
        Outcome::Ok(docs) => Outcome::Ok(Some(docs)),
        Outcome::Err(e) => Outcome::Err(e),
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Fetch the documents matching a reverse-link predicate.
///
/// Placeholders in `template` are filled from `doc`'s top-level fields, so
/// `$uuid` becomes the current document's identifier.
pub async fn resolve_link_from<S: Store>(
    loader: &BatchLoader<'_, S>,
    template: &str,
    doc: &Document,
) -> Outcome<Vec<Option<Document>>, Error> {
    let ids = match loader.fetch_by_query(template, Vars::from(doc)).await {
        Outcome::Ok(ids) => ids,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let lookups: Vec<_> = ids.iter().map(|id| loader.fetch_by_id(id)).collect();
    collect(join_all(lookups).await)
}

/// The predicate finding live `from_type` documents whose `from_property`
/// points at `$uuid`.
///
/// # Example
///
/// ```
/// use docbatch::links::default_link_from_query;
///
/// assert_eq!(
///     default_link_from_query("File", "dataset"),
///     r#"$."@type"[*] == "File" && $.dataset == $uuid && $.status != "deleted" && $.status != "replaced""#,
/// );
/// ```
pub fn default_link_from_query(from_type: &str, from_property: &str) -> String {
    format!(
        "$.\"@type\"[*] == {} && $.{} == $uuid && $.status != \"deleted\" && $.status != \"replaced\"",
        Document::String(from_type.to_string()),
        jsonpath_ident(from_property),
    )
}

/// Parse a `"Type.property"` link declaration into its reverse-link predicate.
///
/// Returns `None` unless the declaration names both a type and a property.
/// Anything after a second `.` is ignored.
pub fn link_from_query(link_from: &str) -> Option<String> {
    let mut parts = link_from.split('.');
    match (parts.next(), parts.next()) {
        (Some(from_type), Some(from_property)) if !from_type.is_empty() && !from_property.is_empty() => {
            Some(default_link_from_query(from_type, from_property))
        }
        _ => None,
    }
}

/// Render `name` as a jsonpath member accessor.
///
/// Plain identifiers are used as is; anything else is quoted as a JSON
/// string, e.g. `@type` becomes `"@type"`.
pub fn jsonpath_ident(name: &str) -> String {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    let re = IDENT_RE
        .get_or_init(|| Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").expect("identifier regex"));
    if re.is_match(name) {
        name.to_string()
    } else {
        Document::String(name.to_string()).to_string()
    }
}

/// Gather lookup outcomes, stopping at the first one that is not `Ok`.
fn collect<T>(outcomes: Vec<Outcome<T, Error>>) -> Outcome<Vec<T>, Error> {
    let mut values = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Outcome::Ok(value) => values.push(value),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
    Outcome::Ok(values)
}

fn reference_type_error(expected: &'static str, actual: &Document, field: &str) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.to_string(),
        column: Some(field.to_string()),
    })
}
