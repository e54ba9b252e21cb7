//! Failure records for one pipeline run, classified by keyword heuristics.

use chrono::Utc;
use drill_core::{Issue, IssueCategory, IssueSeverity};

struct IssuePattern {
    keywords: &'static [&'static str],
    category: IssueCategory,
    severity: IssueSeverity,
    priority: u8,
}

const PATTERNS: &[IssuePattern] = &[
    IssuePattern {
        keywords: &["panicked", "crashed", "uncaught"],
        category: IssueCategory::Unknown,
        severity: IssueSeverity::Critical,
        priority: 10,
    },
    IssuePattern {
        keywords: &["timed out", "timeout", "deadline exceeded"],
        category: IssueCategory::Timeout,
        severity: IssueSeverity::High,
        priority: 9,
    },
    IssuePattern {
        keywords: &["webgl", "canvas", "render", "texture", "shader"],
        category: IssueCategory::Rendering,
        severity: IssueSeverity::Critical,
        priority: 8,
    },
    IssuePattern {
        keywords: &[
            "connection",
            "econnrefused",
            "network",
            "fetch failed",
            "dns",
            "status 5",
        ],
        category: IssueCategory::Network,
        severity: IssueSeverity::High,
        priority: 8,
    },
    IssuePattern {
        keywords: &["out of memory", "quota", "memory", "disk full", "storage full"],
        category: IssueCategory::Resource,
        severity: IssueSeverity::High,
        priority: 7,
    },
    IssuePattern {
        keywords: &["json", "parse", "malformed", "unexpected token", "schema", "deserializ"],
        category: IssueCategory::Data,
        severity: IssueSeverity::Medium,
        priority: 6,
    },
    IssuePattern {
        keywords: &["expected", "assert", "mismatch", "not visible", "missing", "discrepanc"],
        category: IssueCategory::Assertion,
        severity: IssueSeverity::Medium,
        priority: 5,
    },
];

/// Highest-priority pattern wins; the first listed wins a tie.
pub fn classify(message: &str) -> (IssueCategory, IssueSeverity) {
    let lower = message.to_lowercase();
    PATTERNS
        .iter()
        .filter(|pattern| pattern.keywords.iter().any(|kw| lower.contains(kw)))
        .fold(None::<&IssuePattern>, |best, pattern| match best {
            Some(current) if current.priority >= pattern.priority => Some(current),
            _ => Some(pattern),
        })
        .map_or((IssueCategory::Unknown, IssueSeverity::Medium), |pattern| {
            (pattern.category, pattern.severity)
        })
}

pub fn remediation_for(category: IssueCategory) -> &'static str {
    match category {
        IssueCategory::Network => "check that the backend is reachable and retry once it responds",
        IssueCategory::Timeout => "raise the suite timeout or look for a hung request",
        IssueCategory::Rendering => "verify the rendering context is available (WebGL/canvas)",
        IssueCategory::Assertion => "compare the expected state with the captured artifacts",
        IssueCategory::Resource => "free memory or storage on the test host",
        IssueCategory::Data => "inspect the response payload for schema drift",
        IssueCategory::Unknown => "inspect the test log",
    }
}

#[derive(Debug, Clone)]
pub struct IssueTracker {
    issues: Vec<Issue>,
    next_seq: u64,
    auto_address: bool,
}

impl Default for IssueTracker {
    fn default() -> Self {
        Self::new(false)
    }
}

impl IssueTracker {
    pub fn new(auto_address: bool) -> Self {
        Self {
            issues: Vec::new(),
            next_seq: 1,
            auto_address,
        }
    }

    pub fn record(&mut self, test: &str, suite: &str, message: &str) -> &Issue {
        let (category, severity) = classify(message);
        let issue = Issue {
            id: format!("ISSUE-{:04}", self.next_seq),
            test_name: test.to_string(),
            suite_name: suite.to_string(),
            message: message.to_string(),
            severity,
            category,
            remediation: self
                .auto_address
                .then(|| remediation_for(category).to_string()),
            timestamp: Utc::now(),
        };
        self.next_seq += 1;
        self.issues.push(issue);
        &self.issues[self.issues.len() - 1]
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn issues_for(&self, test: &str) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|issue| issue.test_name == test)
            .collect()
    }

    pub fn last(&self) -> Option<&Issue> {
        self.issues.last()
    }

    pub fn count_at_least(&self, severity: IssueSeverity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity >= severity)
            .count()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Drops every issue and restarts numbering at `ISSUE-0001`.
    pub fn clear(&mut self) {
        self.issues.clear();
        self.next_seq = 1;
    }
}
