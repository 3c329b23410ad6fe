//! Field extraction against a container (a listing card) or the whole document
//! (a detail page).
//!
//! Every field is read on its own: a field that is absent or fails to read is
//! logged and reported as Missing, leaving its siblings untouched. Only a lost
//! session is propagated, since nothing else can be read after that either.

use tracing::{debug, warn};

use super::cleaner::{
    after_last, clean_text, format_range, html_to_text, join_values, resolve_url, url_segment,
};
use crate::browser::{BrowserError, Session};
use crate::config::{Combine, FieldSpec, Locator, Read, Transform};
use crate::models::Field;

/// Where a field's locator is evaluated.
pub enum Scope<'e, E> {
    Document,
    Within(&'e E),
}

impl<E> Clone for Scope<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Scope<'_, E> {}

pub async fn extract_field<S: Session>(
    session: &S,
    scope: Scope<'_, S::Element>,
    spec: &FieldSpec,
) -> Result<Option<String>, BrowserError> {
    match try_extract(session, scope, spec).await {
        Ok(Some(value)) => Ok(Some(value)),
        Ok(None) => {
            debug!("{}: not present", spec.field.column());
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Failed to extract {}: {}", spec.field.column(), e);
            Ok(None)
        }
    }
}

/// All `specs` in declaration order, each independently.
pub async fn extract_fields<S: Session>(
    session: &S,
    scope: Scope<'_, S::Element>,
    specs: &[FieldSpec],
) -> Result<Vec<(Field, Option<String>)>, BrowserError> {
    let mut values = Vec::with_capacity(specs.len());
    for spec in specs {
        values.push((spec.field, extract_field(session, scope, spec).await?));
    }
    Ok(values)
}

async fn try_extract<S: Session>(
    session: &S,
    scope: Scope<'_, S::Element>,
    spec: &FieldSpec,
) -> Result<Option<String>, BrowserError> {
    let nodes = match &spec.locator {
        Some(locator) => query(session, scope, locator).await?,
        None => match scope {
            Scope::Within(container) => vec![container.clone()],
            Scope::Document => return Ok(None),
        },
    };

    let value = match &spec.combine {
        Combine::First => read_opt(session, nodes.first(), &spec.read).await?,
        Combine::Nth(i) => read_opt(session, nodes.get(*i), &spec.read).await?,
        Combine::Join(separator) => {
            let mut parts = Vec::with_capacity(nodes.len());
            for node in &nodes {
                if let Some(part) = read(session, node, &spec.read).await? {
                    parts.push(part);
                }
            }
            join_values(parts, separator)
        }
        Combine::Range(max) => {
            let lo = read_opt(session, nodes.first(), &spec.read).await?;
            let hi_nodes = query(session, scope, max).await?;
            let hi = read_opt(session, hi_nodes.first(), &spec.read).await?;
            format_range(lo.as_deref(), hi.as_deref())
        }
    };
    let Some(value) = value else {
        return Ok(None);
    };

    // Links may be relative to the page they were read from.
    let is_link =
        spec.field == Field::SourceUrl || matches!(spec.transform, Some(Transform::UrlSegment(_)));
    let value = if is_link {
        match resolve_url(&session.current_url().await?, &value) {
            Some(url) => url,
            None => return Ok(None),
        }
    } else {
        value
    };

    Ok(match &spec.transform {
        None => Some(value),
        Some(Transform::AfterLast(delimiter)) => after_last(&value, delimiter),
        Some(Transform::UrlSegment(from_end)) => url_segment(&value, *from_end),
    })
}

async fn query<S: Session>(
    session: &S,
    scope: Scope<'_, S::Element>,
    locator: &Locator,
) -> Result<Vec<S::Element>, BrowserError> {
    match scope {
        Scope::Document => session.find_all(locator).await,
        Scope::Within(parent) => session.find_all_in(parent, locator).await,
    }
}

async fn read<S: Session>(
    session: &S,
    node: &S::Element,
    mode: &Read,
) -> Result<Option<String>, BrowserError> {
    Ok(match mode {
        Read::Text => clean_text(&session.text(node).await?),
        Read::Html => html_to_text(&session.inner_html(node).await?),
        Read::Attribute(name) => session
            .attr(node, name)
            .await?
            .as_deref()
            .and_then(clean_text),
    })
}

async fn read_opt<S: Session>(
    session: &S,
    node: Option<&S::Element>,
    mode: &Read,
) -> Result<Option<String>, BrowserError> {
    match node {
        Some(node) => read(session, node, mode).await,
        None => Ok(None),
    }
}
