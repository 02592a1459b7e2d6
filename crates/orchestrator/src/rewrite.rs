//! Markdown image-reference rewriting.
//!
//! Analysis backends emit figure references relative to the paper directory
//! (`![alt](imgs/fig1.png)`). Before an artifact is persisted those targets
//! are rewritten to absolute, externally resolvable paths namespaced by the
//! paper key (`![alt](/papers/<key>/assets/fig1.png)`).
//!
//! `rewrite` is total and idempotent: rewritten targets no longer match the
//! relative-reference pattern, so a second pass is the identity.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::warn;

use paperflow_core::PaperId;

static IMAGE_REF: OnceLock<Regex> = OnceLock::new();

fn image_ref() -> &'static Regex {
    // alt text cannot contain `]`, the target cannot contain `)`.
    IMAGE_REF.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(imgs/([^)]+)\)").unwrap())
}

/// Result of one rewrite call. The pipeline proceeds with `text` even when a
/// warning is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Relative references matched in the input.
    pub references_found: usize,
    /// References actually substituted (including the retry pass).
    pub references_rewritten: usize,
    pub warning: Option<RewriteWarning>,
}

/// Relative references survived substitution and one retry pass.
///
/// This indicates malformed input rather than a transient condition; callers
/// should surface it rather than swallow it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{unresolved} image reference(s) still relative after retry")]
pub struct RewriteWarning {
    pub unresolved: usize,
}

/// Rewrite all relative image references in `text` for `key`.
pub fn rewrite(text: &str, key: &PaperId) -> RewriteOutcome {
    let references_found = image_ref().find_iter(text).count();
    if references_found == 0 {
        return RewriteOutcome {
            text: text.to_string(),
            references_found: 0,
            references_rewritten: 0,
            warning: None,
        };
    }

    let mut out = substitute(text, key);
    let mut references_rewritten = references_found;
    let mut remaining = image_ref().find_iter(&out).count();

    if remaining > 0 {
        // One bounded retry, then report whatever is left.
        references_rewritten += remaining;
        out = substitute(&out, key);
        remaining = image_ref().find_iter(&out).count();
    }

    let warning = if remaining > 0 {
        references_rewritten -= remaining;
        let w = RewriteWarning {
            unresolved: remaining,
        };
        warn!(key = %key, unresolved = remaining, "image references left unrewritten");
        Some(w)
    } else {
        None
    };

    RewriteOutcome {
        text: out,
        references_found,
        references_rewritten,
        warning,
    }
}

fn substitute(text: &str, key: &PaperId) -> String {
    image_ref()
        .replace_all(text, |caps: &Captures<'_>| {
            format!("![{}](/papers/{}/assets/{})", &caps[1], key, &caps[2])
        })
        .into_owned()
}

/// Referenced asset filenames that do not exist under `assets_dir`.
///
/// Probing is advisory; a missing figure file degrades rendering but never
/// fails the pipeline.
pub fn missing_assets(text: &str, assets_dir: &Path) -> Vec<String> {
    image_ref()
        .captures_iter(text)
        .map(|caps| caps[2].to_string())
        .filter(|file| !assets_dir.join(file).is_file())
        .collect()
}
