//! Package name heuristics
//!
//! Flags names that look like typosquats of popular packages or that have
//! an unusual shape. Pure and offline.

use crate::config::NameConfig;
use crate::types::NameVerdict;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Popular package names that typosquats tend to imitate
const DEFAULT_REFERENCE: &[&str] = &[
    // Web browsers
    "firefox", "chrome", "chromium", "brave", "edge", "safari", "opera",
    // Development tools
    "vscode", "code", "sublime", "atom", "vim", "emacs", "nano",
    "git", "github", "gitlab", "bitbucket", "svn",
    "node", "npm", "yarn", "pnpm",
    "python", "pip", "conda", "poetry",
    "java", "maven", "gradle", "ant",
    "rust", "cargo", "rustc",
    "golang", "go",
    "cpp", "gcc", "clang", "make", "cmake",
    "docker", "podman", "kubernetes", "k8s", "helm",
    "jenkins", "travis", "circleci", "github-actions",
    // Media
    "vlc", "mpv", "mplayer", "ffmpeg", "gstreamer",
    "gimp", "photoshop", "inkscape", "krita", "blender",
    "audacity", "audition", "garageband", "pro-tools",
    "obs", "streamlabs", "xsplit",
    "spotify", "apple-music", "youtube-music", "tidal",
    // Communication
    "discord", "slack", "teams", "zoom", "skype", "telegram",
    "whatsapp", "signal", "threema", "matrix",
    // Office and productivity
    "libreoffice", "openoffice", "microsoft-office", "word", "excel",
    "powerpoint", "outlook", "onenote", "notion", "evernote", "trello", "asana",
    // System tools
    "htop", "top", "iotop", "nethogs", "glances",
    "wget", "curl", "aria2", "youtube-dl", "yt-dlp",
    "rsync", "scp", "sftp", "ssh", "telnet",
    "nmap", "wireshark", "tcpdump", "netstat",
    // Package managers
    "pacman", "yay", "paru", "aurman", "pamac",
    "apt", "yum", "dnf", "zypper", "brew",
    // Databases
    "mysql", "postgresql", "mongodb", "redis", "sqlite",
    "mariadb", "oracle", "sql-server",
    // Web servers and runtimes
    "apache", "nginx", "lighttpd", "caddy",
    "nodejs", "php", "ruby", "django", "flask",
    // Security
    "metasploit", "burp-suite", "john", "hashcat", "aircrack-ng", "kali",
    // Virtualization, cloud and DevOps
    "virtualbox", "vmware", "qemu", "kvm", "xen",
    "vagrant", "ansible", "terraform", "puppet", "chef",
    "aws-cli", "azure-cli", "gcloud", "kubectl", "gitlab-ci",
    // Gaming
    "steam", "epic", "origin", "uplay", "gog",
    "minecraft", "roblox", "unity", "unreal-engine",
    // Social media
    "facebook", "twitter", "instagram", "linkedin",
    "reddit", "tiktok", "snapchat", "pinterest",
    // File sharing
    "dropbox", "google-drive", "onedrive", "mega",
    "box", "icloud", "nextcloud", "owncloud",
];

/// Reference names at least this long tolerate two edits instead of one
const LONG_NAME_LEN: usize = 8;

/// Shortest digit run that marks a name as unusual
const DIGIT_RUN: usize = 4;

/// Read-only set of well-known package names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPackages {
    names: BTreeSet<String>,
}

impl KnownPackages {
    /// Build a set from arbitrary names; entries are lowercased
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// The curated list, extended with extra names
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        Self::new(
            DEFAULT_REFERENCE
                .iter()
                .copied()
                .chain(extra.iter().map(|s| s.as_ref())),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in alphabetical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }
}

impl Default for KnownPackages {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE)
    }
}

/// Name heuristic analyzer
#[derive(Debug, Clone)]
pub struct NameAnalyzer {
    reference: Arc<KnownPackages>,
    min_length: usize,
    max_length: usize,
    max_non_alpha_ratio: f64,
}

impl NameAnalyzer {
    pub fn new(reference: Arc<KnownPackages>, config: &NameConfig) -> Self {
        Self {
            reference,
            min_length: config.min_length,
            max_length: config.max_length,
            max_non_alpha_ratio: config.max_non_alpha_ratio,
        }
    }

    /// Analyzer over the configured reference set
    pub fn from_config(config: &NameConfig) -> Self {
        Self::new(
            Arc::new(KnownPackages::with_extra(&config.extra_reference)),
            config,
        )
    }

    pub fn reference(&self) -> &KnownPackages {
        &self.reference
    }

    /// Evaluate a package name.
    ///
    /// Rules run in order and the first hit wins: closeness to a reference
    /// name, then length bounds, then character composition.
    pub fn evaluate(&self, name: &str) -> NameVerdict {
        let lowered = name.to_lowercase();
        if self.reference.contains(&lowered) {
            return NameVerdict::clean();
        }

        if let Some(target) = self.closest_reference(&lowered) {
            return NameVerdict::suspicious(format!("possible typosquat of {}", target));
        }

        let length = lowered.chars().count();
        if length < self.min_length || length > self.max_length {
            return NameVerdict::suspicious(format!(
                "unusual name length {} (expected {}-{})",
                length, self.min_length, self.max_length
            ));
        }

        let non_alpha = lowered.chars().filter(|c| !c.is_alphabetic()).count();
        let ratio = non_alpha as f64 / length as f64;
        if ratio > self.max_non_alpha_ratio {
            return NameVerdict::suspicious(format!(
                "mostly non-alphabetic name ({:.0}% digits or symbols)",
                ratio * 100.0
            ));
        }

        if longest_digit_run(&lowered) >= DIGIT_RUN {
            return NameVerdict::suspicious("long run of digits in name");
        }

        NameVerdict::clean()
    }

    /// Closest reference name within its edit threshold; ties go to the
    /// alphabetically first name
    fn closest_reference(&self, name: &str) -> Option<&str> {
        let name_chars: Vec<char> = name.chars().collect();
        let mut best: Option<(usize, &str)> = None;

        for candidate in self.reference.iter() {
            let candidate_chars: Vec<char> = candidate.chars().collect();
            let threshold = if candidate_chars.len() >= LONG_NAME_LEN { 2 } else { 1 };
            if name_chars.len().abs_diff(candidate_chars.len()) > threshold {
                continue;
            }

            let distance = levenshtein(&name_chars, &candidate_chars);
            if distance == 0 || distance > threshold {
                continue;
            }
            // iteration is alphabetical, so strict less-than keeps the first tie
            if best.map(|(d, _)| distance < d).unwrap_or(true) {
                best = Some((distance, candidate));
            }
        }

        best.map(|(_, name)| name)
    }
}

impl Default for NameAnalyzer {
    fn default() -> Self {
        Self::from_config(&NameConfig::default())
    }
}

/// Edit distance over chars, two rows
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

fn longest_digit_run(name: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in name.chars() {
        if c.is_ascii_digit() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
