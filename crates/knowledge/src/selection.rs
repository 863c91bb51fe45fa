//! Trimming a namespace to the few relevant documents.
//!
//! Heuristic keyword matching, not retrieval. Topic groups are checked in
//! declaration order and each group contributes at most one category (the
//! first whose keywords appear in the corpus). Documents whose filename
//! matches a detected category are preferred over documents whose content
//! matches, and earlier categories over later ones.

use agentgate_core::Document;
use std::collections::HashSet;

/// How much room the caller has left for knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePressure {
    #[default]
    Low,
    /// A sizeable file is attached.
    Medium,
    /// A large file is attached.
    High,
}

impl SizePressure {
    pub fn max_documents(self) -> usize {
        match self {
            Self::Low => 5,
            Self::Medium => 3,
            Self::High => 2,
        }
    }

    /// Derive pressure from the attachment size in characters.
    pub fn from_attachment_len(chars: usize, medium: usize, large: usize) -> Self {
        if chars >= large {
            Self::High
        } else if chars >= medium {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A topic category and the keywords that reveal it.
#[derive(Debug, Clone)]
pub struct TopicCategory {
    pub name: String,
    pub keywords: Vec<String>,
}

impl TopicCategory {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// An ordered group of mutually exclusive categories.
#[derive(Debug, Clone)]
pub struct TopicGroup {
    pub name: String,
    pub categories: Vec<TopicCategory>,
}

impl TopicGroup {
    pub fn new(name: &str, categories: Vec<TopicCategory>) -> Self {
        Self {
            name: name.to_string(),
            categories,
        }
    }
}

/// Everything the ranker looks at for one turn.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest<'a> {
    /// Task label, e.g. the agent id or a sub-task name.
    pub task: &'a str,
    pub message: &'a str,
    pub attachment_text: &'a str,
    /// Prior conversation text.
    pub history: &'a str,
    /// Filename fragment of the document always included for this task.
    pub primary_document: Option<&'a str>,
    pub pressure: SizePressure,
}

impl SelectionRequest<'_> {
    fn corpus(&self) -> String {
        [self.task, self.message, self.attachment_text, self.history]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    }
}

pub struct SelectionRanker {
    groups: Vec<TopicGroup>,
}

impl SelectionRanker {
    pub fn new(groups: Vec<TopicGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[TopicGroup] {
        &self.groups
    }

    /// Categories present in the corpus, at most one per group, in group order.
    pub fn detect<'s>(&'s self, corpus: &str) -> Vec<&'s TopicCategory> {
        self.groups
            .iter()
            .filter_map(|group| group.categories.iter().find(|c| c.matches(corpus)))
            .collect()
    }

    /// Pick the relevant subset of `candidates` for a request.
    ///
    /// Never returns more than `request.pressure.max_documents()` documents
    /// or more than there are candidates.
    pub fn select_relevant(&self, request: &SelectionRequest<'_>, candidates: &[Document]) -> Vec<Document> {
        let cap = request.pressure.max_documents().min(candidates.len());
        if cap == 0 {
            return Vec::new();
        }

        let corpus = request.corpus();
        let detected = self.detect(&corpus);

        let names: Vec<String> = candidates
            .iter()
            .map(|d| normalise_filename(&d.filename))
            .collect();

        let mut picked: Vec<usize> = Vec::with_capacity(cap);
        let mut seen: HashSet<&str> = HashSet::new();
        let mut take = |i: usize, picked: &mut Vec<usize>| {
            if picked.len() < cap && seen.insert(candidates[i].filename.as_str()) {
                picked.push(i);
            }
        };

        if let Some(primary) = request.primary_document.map(normalise_filename)
            && let Some(i) = names.iter().position(|n| n.contains(&primary))
        {
            take(i, &mut picked);
        }
        let after_primary = picked.len();

        for category in &detected {
            for (i, name) in names.iter().enumerate() {
                if category.matches(name) {
                    take(i, &mut picked);
                }
            }
        }

        if picked.len() < cap && !detected.is_empty() {
            let contents: Vec<String> = candidates.iter().map(|d| d.content.to_lowercase()).collect();
            for category in &detected {
                for (i, content) in contents.iter().enumerate() {
                    if category.matches(content) {
                        take(i, &mut picked);
                    }
                }
            }
        }

        if picked.len() == after_primary {
            for i in 0..candidates.len() {
                take(i, &mut picked);
            }
        }

        tracing::debug!(
            task = request.task,
            candidates = candidates.len(),
            detected = ?detected.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            selected = picked.len(),
            "Selected knowledge documents"
        );

        picked.into_iter().map(|i| candidates[i].clone()).collect()
    }
}

impl Default for SelectionRanker {
    /// Topic groups for grant-writing agents: grant type, training type,
    /// industry, intent.
    fn default() -> Self {
        Self::new(vec![
            TopicGroup::new(
                "grant type",
                vec![
                    TopicCategory::new("hiring", &["hiring", "wage subsidy", "new hire", "job creation"]),
                    TopicCategory::new(
                        "training",
                        &["training", "upskill", "skills development", "etg"],
                    ),
                    TopicCategory::new(
                        "market expansion",
                        &["export", "canexport", "international", "market expansion", "trade show"],
                    ),
                    TopicCategory::new(
                        "innovation",
                        &["innovation", "r&d", "research", "irap", "technology adoption"],
                    ),
                    TopicCategory::new("capital", &["capital", "equipment", "loan", "infrastructure"]),
                ],
            ),
            TopicGroup::new(
                "training type",
                vec![
                    TopicCategory::new("leadership", &["leadership", "management", "supervisor"]),
                    TopicCategory::new(
                        "technical",
                        &["technical", "certification", "software", "digital"],
                    ),
                    TopicCategory::new("safety", &["safety", "whmis", "first aid"]),
                    TopicCategory::new("language", &["language", "esl", "communication"]),
                ],
            ),
            TopicGroup::new(
                "industry",
                vec![
                    TopicCategory::new("manufacturing", &["manufacturing", "factory", "production line"]),
                    TopicCategory::new("technology", &["saas", "tech company", "startup"]),
                    TopicCategory::new("agriculture", &["agriculture", "agri", "farm", "food processing"]),
                    TopicCategory::new("construction", &["construction", "trades", "contractor"]),
                    TopicCategory::new("tourism", &["tourism", "hospitality", "hotel", "restaurant"]),
                    TopicCategory::new("healthcare", &["healthcare", "clinic", "medical"]),
                    TopicCategory::new("retail", &["retail", "e-commerce", "store"]),
                ],
            ),
            TopicGroup::new(
                "intent",
                vec![
                    TopicCategory::new("eligibility", &["eligible", "eligibility", "qualify"]),
                    TopicCategory::new("claim", &["claim", "reimbursement", "expense", "invoice"]),
                    TopicCategory::new("review", &["review", "feedback", "audit"]),
                    TopicCategory::new("budget", &["budget", "cost breakdown", "funding amount"]),
                    TopicCategory::new("draft", &["write", "draft", "prepare"]),
                ],
            ),
        ])
    }
}

/// Render selected documents into the knowledge block of a request.
pub fn render_knowledge(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|d| format!("=== {} ===\n{}", d.filename, d.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Lower-case a filename and turn separators into spaces so that
/// `Wage-Subsidy_guide.md` matches the keyword `wage subsidy`.
fn normalise_filename(filename: &str) -> String {
    filename
        .to_lowercase()
        .chars()
        .map(|c| if matches!(c, '-' | '_' | '.' | '/') { ' ' } else { c })
        .collect()
}
