use crate::error::IndexError;

use regex::bytes::Regex;
use regex_syntax::hir::literal::{ExtractKind, Extractor};

/// Tag value predicate evaluated against one tag key's values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagFilter {
    Equal(String),
    In(Vec<String>),
    /// Glob where `*` matches any run of bytes: `x`, `x*`, `*x`, `*x*`, `a*b*c`.
    Like(String),
    /// Regular expression anchored at the start of the value.
    Regex(String),
}

/// A filter ready to run: either a set of exact lookups or a bounded prefix scan.
#[derive(Debug)]
pub(crate) enum CompiledFilter {
    Exact(Vec<Vec<u8>>),
    Scan { prefix: Vec<u8>, matcher: Matcher },
}

#[derive(Debug)]
pub(crate) enum Matcher {
    Glob(Glob),
    Regex(Regex),
}

impl Matcher {
    pub(crate) fn matches(&self, value: &[u8]) -> bool {
        match self {
            Matcher::Glob(g) => g.matches(value),
            Matcher::Regex(re) => re.is_match(value),
        }
    }
}

impl TagFilter {
    pub(crate) fn compile(&self) -> Result<CompiledFilter, IndexError> {
        Ok(match self {
            TagFilter::Equal(v) => CompiledFilter::Exact(vec![v.as_bytes().to_vec()]),
            TagFilter::In(vs) => {
                CompiledFilter::Exact(vs.iter().map(|v| v.as_bytes().to_vec()).collect())
            }
            TagFilter::Like(p) => {
                if !p.contains('*') {
                    return Ok(CompiledFilter::Exact(vec![p.as_bytes().to_vec()]));
                }
                let glob = Glob::new(p);
                CompiledFilter::Scan {
                    prefix: glob.prefix().to_vec(),
                    matcher: Matcher::Glob(glob),
                }
            }
            TagFilter::Regex(p) => {
                let re = Regex::new(&format!("^(?:{})", p))?;
                CompiledFilter::Scan {
                    prefix: literal_prefix(p),
                    matcher: Matcher::Regex(re),
                }
            }
        })
    }
}

/// `*`-only glob split into its literal parts.
#[derive(Debug)]
pub(crate) struct Glob {
    parts: Vec<Vec<u8>>,
}

impl Glob {
    fn new(pattern: &str) -> Self {
        Self {
            parts: pattern.split('*').map(|s| s.as_bytes().to_vec()).collect(),
        }
    }

    /// Literal text before the first `*`.
    fn prefix(&self) -> &[u8] {
        self.parts.first().map_or(&[][..], Vec::as_slice)
    }

    fn matches(&self, value: &[u8]) -> bool {
        let (first, rest) = match self.parts.split_first() {
            Some(x) => x,
            None => return value.is_empty(),
        };
        let Some((last, middle)) = rest.split_last() else {
            return value == first.as_slice();
        };
        if value.len() < first.len() + last.len()
            || !value.starts_with(first)
            || !value.ends_with(last)
        {
            return false;
        }
        let mut window = &value[first.len()..value.len() - last.len()];
        for part in middle {
            match find(window, part) {
                Some(at) => window = &window[at + part.len()..],
                None => return false,
            }
        }
        true
    }
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Bytes every match of `pattern` (anchored at the start) must begin with: the longest
/// common prefix of the pattern's prefix literals. Empty when nothing is common or the
/// pattern cannot be parsed as a Unicode regex.
pub(crate) fn literal_prefix(pattern: &str) -> Vec<u8> {
    let Ok(hir) = regex_syntax::parse(pattern) else {
        return Vec::new();
    };
    let seq = Extractor::new().kind(ExtractKind::Prefix).extract(&hir);
    seq.longest_common_prefix().map(<[u8]>::to_vec).unwrap_or_default()
}
