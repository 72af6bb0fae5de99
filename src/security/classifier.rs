//! Reconnaissance path classification.
//!
//! # Responsibilities
//! - Normalize a request path (lowercase, query stripped)
//! - Test it against an ordered signature set
//! - Report the first matching reason tag
//!
//! # Design Decisions
//! - Pure and total: no I/O, no state, no panics on any input
//! - Signatures are data loaded from config, never control flow
//! - First match wins, in definition order

use crate::config::{ClassifierConfig, MatchKind, SignatureConfig};

pub const REASON_SECRET_FILE: &str = "secret_file";
pub const REASON_VCS_METADATA: &str = "vcs_metadata";
pub const REASON_THIRD_PARTY_CONFIG: &str = "third_party_config";
pub const REASON_BACKUP_FILE: &str = "backup_file";
pub const REASON_BUILD_ARTIFACT: &str = "build_artifact";
pub const REASON_SCANNER_TARGET: &str = "scanner_target";
pub const REASON_HIDDEN_STATIC_FILE: &str = "hidden_static_file";
pub const REASON_BLOCKED_CLIENT: &str = "blocked_client";

/// Classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block { reason: String },
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    pattern: String,
    kind: MatchKind,
    reason: String,
}

impl Signature {
    fn new(pattern: &str, kind: MatchKind, reason: &str) -> Self {
        Self {
            pattern: pattern.to_lowercase(),
            kind,
            reason: reason.to_string(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self.kind {
            MatchKind::Segment => path.split('/').any(|segment| segment == self.pattern),
            MatchKind::Contains => path.contains(self.pattern.as_str()),
            MatchKind::Prefix => path.starts_with(self.pattern.as_str()),
            MatchKind::Suffix => path.ends_with(self.pattern.as_str()),
        }
    }
}

impl From<&SignatureConfig> for Signature {
    fn from(config: &SignatureConfig) -> Self {
        Signature::new(&config.pattern, config.kind, &config.reason)
    }
}

/// Built-in signature table: (pattern, kind, reason).
const DEFAULT_SIGNATURES: &[(&str, MatchKind, &str)] = &[
    // Secrets and environment files
    (".env", MatchKind::Segment, REASON_SECRET_FILE),
    ("/.env.", MatchKind::Contains, REASON_SECRET_FILE),
    (".env", MatchKind::Suffix, REASON_SECRET_FILE),
    (".aws", MatchKind::Segment, REASON_SECRET_FILE),
    (".ssh", MatchKind::Segment, REASON_SECRET_FILE),
    ("id_rsa", MatchKind::Contains, REASON_SECRET_FILE),
    (".htpasswd", MatchKind::Segment, REASON_SECRET_FILE),
    (".htaccess", MatchKind::Segment, REASON_SECRET_FILE),
    (".npmrc", MatchKind::Segment, REASON_SECRET_FILE),
    (".pem", MatchKind::Suffix, REASON_SECRET_FILE),
    (".key", MatchKind::Suffix, REASON_SECRET_FILE),
    // Version control metadata
    (".git", MatchKind::Segment, REASON_VCS_METADATA),
    (".gitignore", MatchKind::Segment, REASON_VCS_METADATA),
    (".svn", MatchKind::Segment, REASON_VCS_METADATA),
    (".hg", MatchKind::Segment, REASON_VCS_METADATA),
    (".bzr", MatchKind::Segment, REASON_VCS_METADATA),
    // Third-party configuration files
    ("wp-config.php", MatchKind::Contains, REASON_THIRD_PARTY_CONFIG),
    ("docker-compose.yml", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("dockerfile", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    (".dockerenv", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("web.config", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("config.php", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("settings.py", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("composer.json", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    ("package.json", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    (".vscode", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    (".idea", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    (".ds_store", MatchKind::Segment, REASON_THIRD_PARTY_CONFIG),
    // Backup and dump files
    (".bak", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".backup", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".old", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".orig", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".swp", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".sql", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".tar.gz", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".tgz", MatchKind::Suffix, REASON_BACKUP_FILE),
    (".zip", MatchKind::Suffix, REASON_BACKUP_FILE),
    ("~", MatchKind::Suffix, REASON_BACKUP_FILE),
    // Interpreter build artifacts
    ("__pycache__", MatchKind::Segment, REASON_BUILD_ARTIFACT),
    (".pyc", MatchKind::Suffix, REASON_BUILD_ARTIFACT),
    (".pytest_cache", MatchKind::Segment, REASON_BUILD_ARTIFACT),
    ("node_modules", MatchKind::Segment, REASON_BUILD_ARTIFACT),
    ("venv", MatchKind::Segment, REASON_BUILD_ARTIFACT),
    (".venv", MatchKind::Segment, REASON_BUILD_ARTIFACT),
    // Common scanner targets
    ("/wp-", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("/wordpress", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("xmlrpc.php", MatchKind::Segment, REASON_SCANNER_TARGET),
    ("phpmyadmin", MatchKind::Contains, REASON_SCANNER_TARGET),
    ("/cgi-bin", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("/actuator", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("/server-status", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("/vendor/phpunit", MatchKind::Prefix, REASON_SCANNER_TARGET),
    ("/boaform", MatchKind::Prefix, REASON_SCANNER_TARGET),
    (".php", MatchKind::Suffix, REASON_SCANNER_TARGET),
    (".asp", MatchKind::Suffix, REASON_SCANNER_TARGET),
    (".aspx", MatchKind::Suffix, REASON_SCANNER_TARGET),
    (".jsp", MatchKind::Suffix, REASON_SCANNER_TARGET),
];

/// Ordered, immutable signature set.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    signatures: Vec<Signature>,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl PathClassifier {
    /// Compile the configured signature set.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut signatures = Vec::new();
        if config.include_defaults {
            signatures.extend(
                DEFAULT_SIGNATURES
                    .iter()
                    .map(|(pattern, kind, reason)| Signature::new(pattern, *kind, reason)),
            );
        }
        signatures.extend(config.signatures.iter().map(Signature::from));
        Self { signatures }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Classify a raw path, which may still carry a query string.
    pub fn classify(&self, path: &str) -> Verdict {
        let normalized = normalize(path);
        self.signatures
            .iter()
            .find(|sig| sig.matches(&normalized))
            .map(|sig| Verdict::Block {
                reason: sig.reason.clone(),
            })
            .unwrap_or(Verdict::Allow)
    }
}

/// Lowercase and drop any query string or fragment.
pub fn normalize(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    path[..end].to_lowercase()
}

/// Whether `path` addresses a dotfile below `static_prefix`.
pub fn is_hidden_static(path: &str, static_prefix: &str) -> bool {
    let normalized = normalize(path);
    let prefix = static_prefix.to_lowercase();
    match normalized.strip_prefix(prefix.as_str()) {
        Some(rest) => rest.split('/').any(|segment| segment.starts_with('.')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(verdict: Verdict) -> String {
        match verdict {
            Verdict::Block { reason } => reason,
            Verdict::Allow => panic!("expected block"),
        }
    }

    #[test]
    fn test_blocks_known_probes() {
        let classifier = PathClassifier::default();
        assert_eq!(reason(classifier.classify("/.env")), REASON_SECRET_FILE);
        assert_eq!(reason(classifier.classify("/.env.production")), REASON_SECRET_FILE);
        assert_eq!(reason(classifier.classify("/app/config.env")), REASON_SECRET_FILE);
        assert_eq!(reason(classifier.classify("/.git/config")), REASON_VCS_METADATA);
        assert_eq!(reason(classifier.classify("/wp-config.php")), REASON_THIRD_PARTY_CONFIG);
        assert_eq!(reason(classifier.classify("/db.sql")), REASON_BACKUP_FILE);
        assert_eq!(reason(classifier.classify("/app/__pycache__/models.cpython-311.pyc")), REASON_BUILD_ARTIFACT);
        assert_eq!(reason(classifier.classify("/wp-login.php")), REASON_SCANNER_TARGET);
        assert_eq!(reason(classifier.classify("/phpMyAdmin/index")), REASON_SCANNER_TARGET);
    }

    #[test]
    fn test_case_and_query_insensitive() {
        let classifier = PathClassifier::default();
        for path in ["/.ENV", "/.Env?x=1", "/.git/HEAD?ref=main", "/BACKUP.BAK#top"] {
            assert!(classifier.classify(path).is_block(), "{path} should be blocked");
        }
    }

    #[test]
    fn test_allows_application_paths() {
        let classifier = PathClassifier::default();
        for path in [
            "/",
            "/matches",
            "/matches/42/report.pdf",
            "/api/matches?season=2024",
            "/static/css/site.css",
            "/login",
            "/environment-stats",
            "/gitlab-users",
        ] {
            assert_eq!(classifier.classify(path), Verdict::Allow, "{path} should pass");
        }
    }

    #[test]
    fn test_custom_signatures_extend_defaults() {
        let config = ClassifierConfig {
            include_defaults: true,
            signatures: vec![SignatureConfig {
                pattern: "/Internal-Debug".into(),
                kind: MatchKind::Prefix,
                reason: "custom_probe".into(),
            }],
        };
        let classifier = PathClassifier::from_config(&config);
        assert_eq!(reason(classifier.classify("/internal-debug/vars")), "custom_probe");
        assert!(classifier.classify("/.git").is_block());
    }

    #[test]
    fn test_defaults_can_be_replaced() {
        let config = ClassifierConfig {
            include_defaults: false,
            signatures: Vec::new(),
        };
        let classifier = PathClassifier::from_config(&config);
        assert!(classifier.is_empty());
        assert_eq!(classifier.classify("/.env"), Verdict::Allow);
    }

    #[test]
    fn test_first_match_wins() {
        let classifier = PathClassifier::default();
        // Matches both the secret-file and backup-file rules.
        assert_eq!(reason(classifier.classify("/.env.bak")), REASON_SECRET_FILE);
    }

    #[test]
    fn test_hidden_static() {
        assert!(is_hidden_static("/static/.secret", "/static/"));
        assert!(is_hidden_static("/STATIC/js/.cache/app.js", "/static/"));
        assert!(!is_hidden_static("/static/js/app.js", "/static/"));
        assert!(!is_hidden_static("/.hidden", "/static/"));
    }

    #[test]
    fn test_classify_handles_odd_input() {
        let classifier = PathClassifier::default();
        assert_eq!(classifier.classify(""), Verdict::Allow);
        assert_eq!(classifier.classify("?"), Verdict::Allow);
        assert_eq!(classifier.classify("/ünïcode/pfad"), Verdict::Allow);
    }
}
