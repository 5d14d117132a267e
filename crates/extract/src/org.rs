//! Link scanning and rewriting in converted Org text.

use crate::consts::ORG_LINK_REGEX;
use crate::references::is_external;
use regex::Captures;

/// One bracket link in Org text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgLink<'a> {
    /// The whole link as written, including any leading `!`.
    pub raw: &'a str,
    /// Link target without a `file:` prefix.
    pub target: &'a str,
    pub description: Option<&'a str>,
    /// Preceded by `!`, left over from a Markdown embed.
    pub embed: bool,
    /// Written with an explicit `file:` prefix.
    pub file_scheme: bool,
}
impl<'a> OrgLink<'a> {
    fn from_captures(caps: &Captures<'a>) -> Option<Self> {
        let raw = caps.get(0)?.as_str();
        let full_target = caps.get(2)?.as_str();
        let (target, file_scheme) = match full_target.strip_prefix("file:") {
            Some(path) => (path, true),
            None => (full_target, false),
        };
        Some(Self {
            raw,
            target,
            description: caps.get(3).map(|m| m.as_str()),
            embed: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
            file_scheme,
        })
    }

    /// Links to anything other than a vault file (`id:`, `https:`, ...).
    pub fn is_external(&self) -> bool {
        !self.file_scheme && is_external(self.target)
    }
}

/// Call `replace` for every link outside source and example blocks, and
/// splice in whatever it returns. `None` keeps the link as it was.
///
/// Links wrapped in verbatim or code markup (`=[[x]]=`, `~[[x]]~`) are not
/// links and are never offered to `replace`.
pub fn rewrite_links(body: &str, mut replace: impl FnMut(&OrgLink<'_>) -> Option<String>) -> String {
    let mut out = String::with_capacity(body.len());
    let mut in_block = false;
    for line in body.split_inclusive('\n') {
        let keyword = line.trim_start().to_ascii_lowercase();
        if in_block {
            in_block = !keyword.starts_with("#+end_");
            out.push_str(line);
            continue;
        }
        if keyword.starts_with("#+begin_src") || keyword.starts_with("#+begin_example") {
            in_block = true;
            out.push_str(line);
            continue;
        }
        let mut last = 0;
        for caps in ORG_LINK_REGEX.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if is_verbatim(line, whole.start(), whole.end()) {
                continue;
            }
            let Some(link) = OrgLink::from_captures(&caps) else { continue };
            if let Some(replacement) = replace(&link) {
                out.push_str(&line[last..whole.start()]);
                out.push_str(&replacement);
                last = whole.end();
            }
        }
        out.push_str(&line[last..]);
    }
    out
}

/// All links outside source and example blocks, in order.
pub fn scan_links(body: &str) -> Vec<String> {
    let mut links = Vec::new();
    rewrite_links(body, |link| {
        links.push(link.raw.to_string());
        None
    });
    links
}

fn is_verbatim(line: &str, start: usize, end: usize) -> bool {
    let before = line[..start].chars().next_back();
    let after = line[end..].chars().next();
    matches!((before, after), (Some('='), Some('=')) | (Some('~'), Some('~')))
}
