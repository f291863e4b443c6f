//! State carried across recipe lines
//!
//! Some risks only show up across lines: a file fetched on one line and run
//! on a later one, or a word that is package metadata rather than a command.

use super::COMMAND_START;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

/// An argument token, without surrounding quotes or shell separators
const TOKEN: &str = r#"["']?([^\s"';|&)<>]+)"#;

lazy_static! {
    static ref FETCH_COMMAND: Regex = Regex::new(r"\b(curl|wget)\b").unwrap();
    static ref CURL_OUTPUT: Regex =
        Regex::new(&format!(r"(?:^|\s)(?:-[A-Za-z]*o\s*|--output(?:\s+|=)){}", TOKEN)).unwrap();
    static ref CURL_REMOTE_NAME: Regex =
        Regex::new(r"(?:^|\s)(?:-[A-Za-z]*O[A-Za-z]*|--remote-name(?:-all)?)(?:\s|$)").unwrap();
    static ref WGET_OUTPUT: Regex = Regex::new(&format!(
        r"(?:^|\s)(?:-[A-Za-z]*O\s*|--output-document(?:\s+|=)){}",
        TOKEN
    ))
    .unwrap();
    static ref REDIRECT: Regex = Regex::new(&format!(r">{{1,2}}\s*{}", TOKEN)).unwrap();
    static ref URL: Regex = Regex::new(r#"\b(?:https?|ftp)://[^\s"'|;&)<>]+"#).unwrap();

    static ref RUN_WITH_INTERPRETER: Regex = Regex::new(&format!(
        r"{}(?:sudo\s+)?(?:ba|z|da|k)?sh\s+(?:-\S+\s+)*{}|{}(?:python[0-9.]*|perl|ruby|node)\s+{}",
        COMMAND_START, TOKEN, COMMAND_START, TOKEN
    ))
    .unwrap();
    static ref SOURCED: Regex =
        Regex::new(&format!(r"{}(?:source|\.)\s+{}", COMMAND_START, TOKEN)).unwrap();
    static ref MADE_EXECUTABLE: Regex = Regex::new(&format!(
        r"\bchmod\s+(?:-\w+\s+)*(?:[ugoa]*\+[rwxXst]*x[rwxXst]*|[0-7]?[1357][0-7]{{2}})\s+{}",
        TOKEN
    ))
    .unwrap();
    static ref RUN_DIRECTLY: Regex = Regex::new(&format!(
        r#"{}(?:sudo\s+)?["']?((?:\./|/|\$\{{?\w+\}}?/)[^\s"';|&)<>]*)"#,
        COMMAND_START
    ))
    .unwrap();

    static ref METADATA_ASSIGNMENT: Regex = Regex::new(
        r"^(pkgname|pkgbase|pkgver|pkgrel|epoch|pkgdesc|url|license|groups|arch|depends|makedepends|checkdepends|optdepends|provides|conflicts|replaces|backup|options|install|changelog|noextract|validpgpkeys|source|[a-z0-9]+sums)(_[A-Za-z0-9_]+)?\+?=(.*)$"
    )
    .unwrap();
}

/// The file name a path or URL refers to, used to pair downloads with runs
fn file_key(token: &str) -> Option<String> {
    let token = token.trim_matches(|c: char| c == '"' || c == '\'');
    let token = token.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    let name = token.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match name {
        "" | "-" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Remembers files fetched by curl or wget so a later line running one can
/// be reported
#[derive(Debug, Default)]
pub(crate) struct DownloadTracker {
    fetched: BTreeSet<String>,
}

impl DownloadTracker {
    /// The downloaded file this line executes, if any.
    ///
    /// Only files recorded from earlier lines count.
    pub(crate) fn executed_download(&self, line: &str) -> Option<String> {
        if self.fetched.is_empty() {
            return None;
        }

        [&*RUN_WITH_INTERPRETER, &*SOURCED, &*MADE_EXECUTABLE, &*RUN_DIRECTLY]
            .into_iter()
            .flat_map(|re| re.captures_iter(line))
            .filter_map(|caps| {
                caps.iter()
                    .skip(1)
                    .flatten()
                    .last()
                    .and_then(|m| file_key(m.as_str()))
            })
            .find(|key| self.fetched.contains(key))
    }

    /// Record the files a curl or wget line writes
    pub(crate) fn record(&mut self, line: &str) {
        let Some(fetch) = FETCH_COMMAND.captures(line) else {
            return;
        };
        let command = &line[fetch.get(0).map_or(0, |m| m.start())..];
        let is_curl = &fetch[1] == "curl";

        let explicit = if is_curl {
            CURL_OUTPUT.captures(command)
        } else {
            WGET_OUTPUT.captures(command)
        };

        let mut names: Vec<String> = Vec::new();
        if let Some(caps) = explicit {
            names.extend(file_key(&caps[1]));
        } else if !is_curl || CURL_REMOTE_NAME.is_match(command) {
            names.extend(URL.find_iter(command).filter_map(|m| file_key(m.as_str())));
        }
        names.extend(
            REDIRECT
                .captures_iter(command)
                .filter_map(|caps| file_key(&caps[1])),
        );

        self.fetched.extend(names);
    }
}

/// Net change in parenthesis depth, ignoring quoted text
fn paren_balance(text: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Follows package metadata assignments such as `depends=(...)`, including
/// arrays spread over several lines
#[derive(Debug, Default)]
pub(crate) struct MetadataTracker {
    depth: i32,
}

impl MetadataTracker {
    /// Whether this trimmed line is part of a metadata assignment.
    ///
    /// A value with command substitution is code, not metadata.
    pub(crate) fn observe(&mut self, line: &str) -> bool {
        if self.depth > 0 {
            self.depth = (self.depth + paren_balance(line)).max(0);
            return true;
        }

        let Some(caps) = METADATA_ASSIGNMENT.captures(line) else {
            return false;
        };
        let value = caps.get(3).map_or("", |m| m.as_str());
        if value.contains("$(") || value.contains('`') {
            return false;
        }
        self.depth = paren_balance(value).max(0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(lines: &[&str]) -> DownloadTracker {
        let mut tracker = DownloadTracker::default();
        for line in lines {
            tracker.record(line);
        }
        tracker
    }

    #[test]
    fn test_curl_output_names() {
        let tracker = tracked(&[
            "curl -sLo installer.sh https://example.org/installer.sh",
            "curl --output=\"$srcdir/payload.bin\" https://example.org/p",
            "curl -fsSLO https://example.org/dist/tool.run?token=1",
            "curl https://example.org/raw > fetched.sh",
            "curl https://example.org/ignored.sh",
        ]);
        assert!(tracker.fetched.contains("installer.sh"));
        assert!(tracker.fetched.contains("payload.bin"));
        assert!(tracker.fetched.contains("tool.run"));
        assert!(tracker.fetched.contains("fetched.sh"));
        assert!(!tracker.fetched.contains("ignored.sh"));
    }

    #[test]
    fn test_wget_names() {
        let tracker = tracked(&[
            "wget https://example.org/setup",
            "wget -qO helper.py https://example.org/h",
            "wget -O - https://example.org/stdout.sh",
        ]);
        assert!(tracker.fetched.contains("setup"));
        assert!(tracker.fetched.contains("helper.py"));
        assert!(!tracker.fetched.contains("h"));
        assert!(!tracker.fetched.contains("-"));
    }

    #[test]
    fn test_executions_of_downloads() {
        let tracker = tracked(&["wget https://example.org/setup", "curl -o run.sh https://x.example/r"]);
        assert_eq!(tracker.executed_download("  chmod +x setup").as_deref(), Some("setup"));
        assert_eq!(tracker.executed_download("  ./setup --quiet").as_deref(), Some("setup"));
        assert_eq!(
            tracker.executed_download("  \"$srcdir/setup\"").as_deref(),
            Some("setup")
        );
        assert_eq!(tracker.executed_download("  bash -e run.sh").as_deref(), Some("run.sh"));
        assert_eq!(tracker.executed_download("make && source run.sh").as_deref(), Some("run.sh"));
        assert_eq!(tracker.executed_download("  chmod 755 run.sh").as_deref(), Some("run.sh"));
    }

    #[test]
    fn test_unrelated_lines_not_executions() {
        let tracker = tracked(&["wget https://example.org/setup"]);
        assert!(tracker.executed_download("  ./configure --prefix=/usr").is_none());
        assert!(tracker.executed_download("  bash build.sh").is_none());
        assert!(tracker.executed_download("  chmod 644 setup").is_none());
        assert!(tracker.executed_download("  install -Dm644 setup \"$pkgdir/usr/share/setup\"").is_none());
        assert!(DownloadTracker::default().executed_download("bash setup").is_none());
    }

    #[test]
    fn test_metadata_lines() {
        let mut meta = MetadataTracker::default();
        assert!(meta.observe("pkgdesc=\"Bash completion for sudo and doas\""));
        assert!(meta.observe("depends=('sudo')"));
        assert!(meta.observe("optdepends=("));
        assert!(meta.observe("'cronie: for (optional) crontab support'"));
        assert!(meta.observe(")"));
        assert!(!meta.observe("sudo make install"));
        assert!(!meta.observe("pkgver=$(sudo cat /root/version)"));
        assert!(!meta.observe("_commit=abc123"));
    }
}
