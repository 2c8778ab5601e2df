//! JavaScript snippets evaluated in the page.
//!
//! Every snippet returns an object tagged with `status` so a missing element
//! never comes back as a bare `null`. Rows enumerated by [`enumerate_rows`]
//! are parked on `window.__tablecap` together with their generation; later
//! reads check that generation before touching a row.

use serde::Deserialize;
use serde_json::json;

use tablecap::{ControlTarget, Locator, Read, RowScope, ScrollAmount};

/// Decoded result of a snippet.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply<T> {
    Ok { value: T },
    /// Element, attribute, or container not found.
    Missing,
    /// The parked rows belong to another generation.
    Stale,
}

fn literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    // JSON is valid JavaScript literal syntax
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

const PARKED_ROW: &str = r#"
  const parked = window.__tablecap;
  if (!parked || parked.generation !== GENERATION) return { status: "stale" };
  let el = parked.rows[INDEX];
  if (!el || !el.isConnected) return { status: "missing" };"#;

fn parked_row(generation: u64, index: usize) -> String {
    PARKED_ROW
        .replace("GENERATION", &generation.to_string())
        .replace("INDEX", &index.to_string())
}

/// Find the rows of `scope`, park them under `generation`, return their count.
pub fn enumerate_rows(scope: &RowScope, generation: u64) -> String {
    format!(
        r#"(() => {{
  const container = document.querySelector({container});
  if (!container) return {{ status: "missing" }};
  const rows = Array.from(container.querySelectorAll({rows}));
  window.__tablecap = {{ generation: {generation}, rows }};
  return {{ status: "ok", value: rows.length }};
}})()"#,
        container = literal(&scope.container),
        rows = literal(&scope.rows),
    )
}

/// Count rows of `scope` without parking them.
pub fn count_rows(scope: &RowScope) -> String {
    format!(
        r#"(() => {{
  const container = document.querySelector({container});
  if (!container) return {{ status: "missing" }};
  return {{ status: "ok", value: container.querySelectorAll({rows}).length }};
}})()"#,
        container = literal(&scope.container),
        rows = literal(&scope.rows),
    )
}

/// Rendered text of a parked row.
pub fn row_text(generation: u64, index: usize) -> String {
    format!(
        r#"(() => {{{parked}
  return {{ status: "ok", value: el.innerText }};
}})()"#,
        parked = parked_row(generation, index),
    )
}

/// Follow a locator from a parked row and read the target.
pub fn read(generation: u64, index: usize, locator: &Locator) -> String {
    let steps: Vec<_> = locator
        .steps
        .iter()
        .map(|s| json!([s.selector, s.index]))
        .collect();
    let read = match &locator.read {
        Read::Text => json!({ "kind": "text" }),
        Read::Html => json!({ "kind": "html" }),
        Read::Attribute(name) => json!({ "kind": "attribute", "name": name }),
    };
    format!(
        r#"(() => {{{parked}
  for (const [selector, index] of {steps}) {{
    const found = el.querySelectorAll(selector);
    if (index >= found.length) return {{ status: "missing" }};
    el = found[index];
  }}
  const read = {read};
  let value;
  if (read.kind === "attribute") value = el.getAttribute(read.name);
  else if (read.kind === "html") value = el.innerHTML;
  else value = el.innerText;
  if (value === null || value === undefined) return {{ status: "missing" }};
  return {{ status: "ok", value: String(value) }};
}})()"#,
        parked = parked_row(generation, index),
        steps = literal(&steps),
        read = read,
    )
}

pub fn scroll(amount: ScrollAmount) -> String {
    let dy = match amount {
        ScrollAmount::Viewport => "window.innerHeight".to_string(),
        ScrollAmount::Pixels(px) => px.to_string(),
    };
    format!(r#"(() => {{ window.scrollBy(0, {dy}); return {{ status: "ok", value: true }}; }})()"#)
}

/// Click the first element matching the target.
pub fn click(target: &ControlTarget) -> String {
    format!(
        r#"(() => {{
  const wanted = {text};
  const el = Array.from(document.querySelectorAll({selector}))
    .find(e => wanted === null || (e.innerText || "").trim().includes(wanted));
  if (!el) return {{ status: "missing" }};
  el.click();
  return {{ status: "ok", value: true }};
}})()"#,
        text = literal(&target.text),
        selector = literal(&target.selector),
    )
}

pub fn has_element(selector: &str) -> String {
    format!(
        r#"(() => ({{ status: "ok", value: document.querySelector({}) !== null }}))()"#,
        literal(selector)
    )
}
