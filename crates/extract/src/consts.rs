use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// File extensions that name a note rather than an asset.
pub const NOTE_EXTENSIONS: &[&str] = &["md", "markdown"];

// `[[Target]]`, `[[Target|Label]]`, `![[image.png]]`
regex!(WIKILINK_REGEX, r"(!?)\[\[([^\[\]|]+?)(?:\|([^\[\]]*))?\]\]");
// `[Label](target.md)`, `![alt](<path with spaces.png> "title")`
regex!(MARKDOWN_LINK_REGEX, r#"(!?)\[([^\[\]]*)\]\((?:<([^<>]+)>|([^()\s]+))(?:\s+"[^"]*")?\)"#);
regex!(INLINE_CODE_REGEX, r"`[^`\n]*`");
// `[[file:target][description]]`, `[[target]]`, with an optional leading `!`
regex!(ORG_LINK_REGEX, r"(!?)\[\[([^\[\]]+)\](?:\[([^\[\]]*)\])?\]");
regex!(SCHEME_REGEX, r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]");
