//! Pattern catalog for recipe scanning

mod loader;
mod tracking;

pub use loader::RuleLoader;

use crate::error::{AnalysisError, Result};
use crate::types::{Category, Severity};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};
use tracking::{DownloadTracker, MetadataTracker};

/// A detection rule
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    /// Unique identifier (e.g., "DLE-001")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Detailed description
    pub description: String,
    /// Severity level
    pub severity: Severity,
    /// Category of the rule
    pub category: Category,
    /// Patterns to match; any one of them triggers the rule
    pub patterns: Vec<Pattern>,
    /// Recommendation shown next to a finding
    #[serde(default)]
    pub recommendation: String,
    /// Which lines the rule looks at
    #[serde(default)]
    pub scope: MatchScope,
    /// Also fire on a line that runs a file fetched by an earlier line
    #[serde(default)]
    pub follow_downloads: bool,
    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Lines a rule is matched against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// Every non-comment line
    #[default]
    All,
    /// Skip package metadata assignments like `depends=(...)` or `pkgdesc=`
    Commands,
}

/// Pattern type for matching
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pattern {
    /// Regular expression pattern
    Regex { pattern: String },
    /// Literal string match
    Literal {
        text: String,
        #[serde(default)]
        case_sensitive: bool,
    },
}

/// A compiled pattern ready for matching
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Regex(Regex),
    Literal { text: String, case_sensitive: bool },
}

impl CompiledPattern {
    /// Compile a pattern
    pub fn compile(pattern: &Pattern) -> Result<Self> {
        match pattern {
            Pattern::Regex { pattern } => Ok(CompiledPattern::Regex(Regex::new(pattern)?)),
            Pattern::Literal {
                text,
                case_sensitive,
            } => {
                if text.is_empty() {
                    return Err(AnalysisError::Rule("empty literal pattern".into()));
                }
                Ok(CompiledPattern::Literal {
                    text: if *case_sensitive {
                        text.clone()
                    } else {
                        text.to_lowercase()
                    },
                    case_sensitive: *case_sensitive,
                })
            }
        }
    }

    fn is_match(&self, line: &str, lowered: &str) -> bool {
        match self {
            CompiledPattern::Regex(re) => re.is_match(line),
            CompiledPattern::Literal {
                text,
                case_sensitive,
            } => {
                let haystack = if *case_sensitive { line } else { lowered };
                haystack.contains(text.as_str())
            }
        }
    }
}

/// A rule with its patterns compiled
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Original rule definition
    pub rule: Rule,
    /// Compiled patterns
    pub compiled_patterns: Vec<CompiledPattern>,
}

impl CompiledRule {
    fn compile(rule: Rule) -> Result<Self> {
        if rule.patterns.is_empty() {
            return Err(AnalysisError::Rule(format!("rule {} has no patterns", rule.id)));
        }
        let compiled_patterns = rule
            .patterns
            .iter()
            .map(CompiledPattern::compile)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| AnalysisError::Rule(format!("rule {}: {}", rule.id, e)))?;
        Ok(Self {
            rule,
            compiled_patterns,
        })
    }
}

/// A match result from the catalog
#[derive(Debug, Clone)]
pub struct RuleMatch {
    /// The rule that matched
    pub rule_id: String,
    /// Line number where the match occurred (1-indexed)
    pub line: usize,
    /// The full line
    pub context: String,
}

/// Immutable, ordered set of detection rules.
///
/// Built once at startup and shared read-only between analyses.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    rules: Vec<CompiledRule>,
}

impl PatternCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Catalog holding the built-in rules
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        for rule in builtin_rules() {
            catalog.add_rule(rule)?;
        }
        Ok(catalog)
    }

    /// Load rules from a directory containing TOML files.
    ///
    /// A rule that does not compile is logged and skipped. Returns how many
    /// rules were taken.
    pub fn load_rules_from_dir(&mut self, dir: &Path) -> Result<usize> {
        let rules = RuleLoader::new().load_from_directory(dir)?;
        let mut loaded = 0;
        for rule in rules {
            let id = rule.id.clone();
            match self.add_rule(rule) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Skipping rule {} from {}: {}", id, dir.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Add a rule; a rule with an existing id replaces the old one in place
    pub fn add_rule(&mut self, rule: Rule) -> Result<()> {
        if !rule.enabled {
            self.rules.retain(|r| r.rule.id != rule.id);
            return Ok(());
        }

        let compiled = CompiledRule::compile(rule)?;
        match self.rules.iter_mut().find(|r| r.rule.id == compiled.rule.id) {
            Some(existing) => {
                debug!("Overriding rule {}", compiled.rule.id);
                *existing = compiled;
            }
            None => self.rules.push(compiled),
        }
        Ok(())
    }

    /// Match content line by line.
    ///
    /// Matches are ordered by line, then by catalog order within a line. A rule
    /// reports at most once per line. Pure comment lines are skipped.
    pub fn match_content(&self, content: &str) -> Vec<RuleMatch> {
        let mut matches = Vec::new();
        let mut downloads = DownloadTracker::default();
        let mut metadata = MetadataTracker::default();

        for (line_idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let is_metadata = metadata.observe(trimmed);
            let runs_download = downloads.executed_download(line);
            downloads.record(line);
            if let Some(file) = &runs_download {
                debug!("Line {} runs downloaded file {}", line_idx + 1, file);
            }
            let lowered = line.to_lowercase();

            for compiled in &self.rules {
                let rule = &compiled.rule;
                if is_metadata && rule.scope == MatchScope::Commands {
                    continue;
                }
                let hit = (rule.follow_downloads && runs_download.is_some())
                    || compiled
                        .compiled_patterns
                        .iter()
                        .any(|p| p.is_match(line, &lowered));
                if hit {
                    matches.push(RuleMatch {
                        rule_id: rule.id.clone(),
                        line: line_idx + 1,
                        context: line.to_string(),
                    });
                }
            }
        }

        matches
    }

    /// Get a rule by ID
    pub fn get_rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.rule.id == id).map(|c| &c.rule)
    }

    /// Get count of loaded rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn regexes(patterns: &[&str]) -> Vec<Pattern> {
    patterns
        .iter()
        .map(|p| Pattern::Regex {
            pattern: p.to_string(),
        })
        .collect()
}

/// Start of a shell command: line start, after a separator or pipe, inside a
/// substitution, or after a keyword that runs the next word
const COMMAND_START: &str = r"(?:^|[;&|(`]|\$\(|\b(?:then|do|else|exec|xargs|nohup)\s)\s*";

/// Absolute system prefixes a recipe has no business writing to outside $pkgdir
const SYSTEM_PREFIX: &str = r"(/etc|/usr|/bin|/sbin|/lib|/lib64|/opt|/var|/root|/boot|/srv)/";

/// Built-in detection rules
fn builtin_rules() -> Vec<Rule> {
    let system_write = format!(
        r#"\b(cp|mv|install|tee|touch|mkdir|rm)\b[^#]*[\s"']{}[^\s"']*["']?\s*$"#,
        SYSTEM_PREFIX
    );
    let system_redirect = format!(r#">>?\s*["']?{}"#, SYSTEM_PREFIX);
    let crontab = format!(r"{}crontab\b", COMMAND_START);
    let escalate = format!(r"{}(sudo|doas|pkexec)\b", COMMAND_START);
    let switch_user = format!(r"{}su\s+(-c\s|-l\b|-(\s|$)|root\b)", COMMAND_START);
    let visudo = format!(r"{}visudo\b", COMMAND_START);

    vec![
        // ============================================================
        // Download and execute
        // ============================================================
        Rule {
            id: "DLE-001".to_string(),
            name: "Curl piped to shell".to_string(),
            description: "Remote content is downloaded with curl and executed directly by a shell".to_string(),
            severity: Severity::High,
            category: Category::RemoteExecution,
            patterns: regexes(&[r"\bcurl\b[^|]*\|\s*(sudo\s+)?(ba|z|da)?sh\b"]),
            recommendation: "Download scripts first, review them, then execute".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "DLE-002".to_string(),
            name: "Wget piped to shell".to_string(),
            description: "Remote content is downloaded with wget and executed directly by a shell".to_string(),
            severity: Severity::High,
            category: Category::RemoteExecution,
            patterns: regexes(&[r"\bwget\b[^|]*\|\s*(sudo\s+)?(ba|z|da)?sh\b"]),
            recommendation: "Download scripts first, review them, then execute".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "DLE-003".to_string(),
            name: "Downloaded file executed".to_string(),
            description: "A downloaded file is executed, made executable or sourced".to_string(),
            severity: Severity::High,
            category: Category::RemoteExecution,
            patterns: regexes(&[
                r"\b(curl|wget)\b.*(&&|;)\s*(sudo\s+)?(ba|z|da)?sh\s+\S",
                r"\b(curl|wget)\b.*(&&|;)\s*(chmod\s+[augo]*\+x\b|\./)",
            ]),
            recommendation: "Fetch files through the source array so they are checksummed".to_string(),
            scope: MatchScope::All,
            follow_downloads: true,
            enabled: true,
        },
        Rule {
            id: "DLE-004".to_string(),
            name: "Remote content substituted into a shell".to_string(),
            description: "Output of curl or wget is evaluated through command or process substitution".to_string(),
            severity: Severity::High,
            category: Category::RemoteExecution,
            patterns: regexes(&[
                r#"\b(ba|z|da)?sh\s+-c\s+["']?\$\(\s*(curl|wget)\b"#,
                r"\b(source|\.)\s+<\(\s*(curl|wget)\b",
                r#"\beval\s+["']?\$\(\s*(curl|wget)\b"#,
            ]),
            recommendation: "Never evaluate remote content during a build".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },

        // ============================================================
        // Writes outside the build directory
        // ============================================================
        Rule {
            id: "FS-001".to_string(),
            name: "Write to system path".to_string(),
            description: "Files are written to the live system instead of $pkgdir".to_string(),
            severity: Severity::Medium,
            category: Category::OutsideBuildDir,
            patterns: regexes(&[system_write.as_str(), system_redirect.as_str()]),
            recommendation: "Install files under \"$pkgdir\" and let pacman place them".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "FS-002".to_string(),
            name: "Write to user home".to_string(),
            description: "Files are written into a user's home directory".to_string(),
            severity: Severity::Medium,
            category: Category::OutsideBuildDir,
            patterns: regexes(&[
                r#">>?\s*["']?(~|\$HOME|\$\{HOME\}|/home/[^/\s]+)/"#,
                r#"\b(cp|mv|install|tee|touch|mkdir)\b[^#]*[\s"'](~|\$HOME|\$\{HOME\}|/home/[^/\s]+)/"#,
            ]),
            recommendation: "Packages must not touch home directories".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "FS-003".to_string(),
            name: "Persistence location".to_string(),
            description: "Recipe touches locations used to run code at boot, login or on a schedule".to_string(),
            severity: Severity::High,
            category: Category::Persistence,
            patterns: regexes(&[
                r"/etc/(ld\.so\.preload|rc\.local|crontab|cron\.(d|daily|hourly|weekly|monthly)|profile\.d|xdg/autostart)",
                crontab.as_str(),
                r"(~|\$HOME|\$\{HOME\})/\.(bashrc|zshrc|profile|bash_profile|config/autostart)",
                r"\bsystemctl\s+(--user\s+)?(enable|start)\b",
            ]),
            recommendation: "Ship units and hooks as files; let the user enable them".to_string(),
            scope: MatchScope::Commands,
            follow_downloads: false,
            enabled: true,
        },

        // ============================================================
        // Network
        // ============================================================
        Rule {
            id: "NET-001".to_string(),
            name: "Raw IP in URL".to_string(),
            description: "URLs with raw IP addresses avoid DNS and are common in malware".to_string(),
            severity: Severity::High,
            category: Category::Network,
            patterns: regexes(&[r"\b(https?|ftp|wss?)://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}"]),
            recommendation: "Use domain names from trusted sources".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "NET-002".to_string(),
            name: "Reverse shell".to_string(),
            description: "Pattern indicates an interactive shell bound to a network connection".to_string(),
            severity: Severity::High,
            category: Category::Network,
            patterns: regexes(&[
                r"/dev/(tcp|udp)/",
                r"\bnc(at)?\b[^#]*\s-(e|c)\s",
                r"\bsocat\b[^#]*\b(EXEC|SYSTEM|TCP)[:-]",
            ]),
            recommendation: "Remove reverse shell code immediately".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "NET-003".to_string(),
            name: "Untrusted host".to_string(),
            description: "Paste sites, URL shorteners, anonymous file hosts and dynamic DNS are rarely legitimate sources".to_string(),
            severity: Severity::Medium,
            category: Category::Network,
            patterns: regexes(&[
                r"(pastebin\.com|paste\.ee|ptpb\.pw|ix\.io|dpaste|hastebin|termbin\.com|rentry\.co)",
                r"(bit\.ly|tinyurl\.com|is\.gd|goo\.gl|0x0\.st|transfer\.sh)/",
                r"\.(duckdns|no-ip|ddns|hopto|zapto|sytes)\.",
                r"discord(app)?\.com/api/webhooks",
            ]),
            recommendation: "Always use full URLs from the upstream project".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "NET-004".to_string(),
            name: "Hardcoded IP address and port".to_string(),
            description: "A literal IP:port endpoint is embedded in the recipe".to_string(),
            severity: Severity::Medium,
            category: Category::Network,
            patterns: regexes(&[r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}:\d{2,5}\b"]),
            recommendation: "Verify what the endpoint is and why the build needs it".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "NET-005".to_string(),
            name: "Data upload".to_string(),
            description: "Data is posted or uploaded to a remote server".to_string(),
            severity: Severity::High,
            category: Category::Exfiltration,
            patterns: regexes(&[
                r"\bcurl\b[^#]*\s(-d|--data(-binary|-raw|-urlencode)?|-F|--form|-T|--upload-file)\s",
                r"\bwget\b[^#]*--post-(data|file)",
            ]),
            recommendation: "Builds have no reason to send data anywhere".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },

        // ============================================================
        // Privilege escalation
        // ============================================================
        Rule {
            id: "PRIV-001".to_string(),
            name: "Privilege escalation command".to_string(),
            description: "Recipes run unprivileged and should never invoke sudo, doas, pkexec or su".to_string(),
            severity: Severity::High,
            category: Category::PrivilegeEscalation,
            patterns: regexes(&[escalate.as_str(), switch_user.as_str()]),
            recommendation: "Remove privilege escalation; makepkg handles permissions".to_string(),
            scope: MatchScope::Commands,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "PRIV-002".to_string(),
            name: "SUID/SGID bit setting".to_string(),
            description: "Setting SUID/SGID bits can enable privilege escalation".to_string(),
            severity: Severity::High,
            category: Category::PrivilegeEscalation,
            patterns: regexes(&[
                r"\bchmod\s+(-\w+\s+)*0?[2-7][0-7]{3}\b",
                r"\bchmod\s+(-\w+\s+)*[ugoa]*\+[rwx]*s",
                r"\binstall\b[^#]*\s-[a-zA-Z]*m\s*0?[2-7][0-7]{3}\b",
            ]),
            recommendation: "SUID/SGID bits should rarely be set; review carefully".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "PRIV-003".to_string(),
            name: "Sudoers modification".to_string(),
            description: "Modifying sudoers grants permanent privilege escalation".to_string(),
            severity: Severity::High,
            category: Category::PrivilegeEscalation,
            patterns: regexes(&[r"/etc/sudoers", visudo.as_str()]),
            recommendation: "Packages should never modify sudoers".to_string(),
            scope: MatchScope::Commands,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "PRIV-004".to_string(),
            name: "File capabilities".to_string(),
            description: "File capabilities grant elevated privileges to a binary".to_string(),
            severity: Severity::Medium,
            category: Category::PrivilegeEscalation,
            patterns: regexes(&[r"\bsetcap\s+"]),
            recommendation: "Verify capabilities are necessary and minimal".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },

        // ============================================================
        // Obfuscation
        // ============================================================
        Rule {
            id: "OBF-001".to_string(),
            name: "Base64 decoding".to_string(),
            description: "Base64 decoding may hide a payload".to_string(),
            severity: Severity::Medium,
            category: Category::Obfuscation,
            patterns: regexes(&[r"\bbase64\s+(-[a-zA-Z]*d|--decode)"]),
            recommendation: "Decode and review the base64 content manually".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "OBF-002".to_string(),
            name: "Decoded payload piped to shell".to_string(),
            description: "Encoded or compressed content is decoded and executed".to_string(),
            severity: Severity::High,
            category: Category::Obfuscation,
            patterns: regexes(&[
                r"(\bbase64\s+(-[a-zA-Z]*d|--decode)|\bxxd\s+-r|\bopenssl\b[^|]*\s-d\b|\bgunzip\b|\bzcat\b|\bgzip\s+-d|\brev\b)[^|]*\|\s*(ba|z|da)?sh\b",
            ]),
            recommendation: "Decode the content and review it before anything runs it".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "OBF-003".to_string(),
            name: "Eval usage".to_string(),
            description: "Eval can execute obfuscated code".to_string(),
            severity: Severity::Medium,
            category: Category::Obfuscation,
            patterns: regexes(&[r"\beval\s+"]),
            recommendation: "Avoid eval; use direct commands instead".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "OBF-004".to_string(),
            name: "Hex escape sequence".to_string(),
            description: "Runs of hex escapes can hide commands".to_string(),
            severity: Severity::Low,
            category: Category::Obfuscation,
            patterns: regexes(&[r"(\\x[0-9a-fA-F]{2}){4,}"]),
            recommendation: "Decode and review hex-encoded content".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
        Rule {
            id: "OBF-005".to_string(),
            name: "Encoded blob in pipeline".to_string(),
            description: "A long encoded string is echoed into another command".to_string(),
            severity: Severity::Medium,
            category: Category::Obfuscation,
            patterns: regexes(&[r#"\becho\s+(-n\s+)?["']?[A-Za-z0-9+/]{60,}={0,2}["']?\s*\|"#]),
            recommendation: "Decode the blob and review it".to_string(),
            scope: MatchScope::All,
            follow_downloads: false,
            enabled: true,
        },
    ]
}
