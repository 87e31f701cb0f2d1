use crate::fingerprint::pattern_hash;
use crate::normalize::normalize_line;
use crate::severity::{classify, Severity};
use ahash::AHashMap;

/// One pattern as observed within a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPattern {
    pub id: String,
    pub pattern: String,
    pub severity: Severity,
    pub count: usize,
    /// First raw line in the batch that produced this pattern.
    pub sample: String,
}

/// Per-run aggregation keyed by pattern id.
///
/// Iteration follows first occurrence in the batch, which gives the report
/// builder a stable tie order for equal counts.
#[derive(Debug, Clone, Default)]
pub struct Window {
    patterns: Vec<WindowPattern>,
    index: AHashMap<String, usize>,
}

impl Window {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.patterns.len() }

    pub fn is_empty(&self) -> bool { self.patterns.is_empty() }

    pub fn get(&self, id: &str) -> Option<&WindowPattern> {
        self.index.get(id).map(|&i| &self.patterns[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowPattern> {
        self.patterns.iter()
    }

    /// Sum of all counts, i.e. lines that normalized to something.
    pub fn total_lines(&self) -> usize {
        self.patterns.iter().map(|p| p.count).sum()
    }

    /// Add `count` occurrences. Later inserts for an existing id bump the
    /// count and refresh the classification but never replace the sample.
    pub fn insert(&mut self, wp: WindowPattern) {
        match self.index.get(&wp.id) {
            Some(&i) => {
                let cur = &mut self.patterns[i];
                cur.count += wp.count;
                cur.severity = wp.severity;
                cur.pattern = wp.pattern;
            }
            None => {
                self.index.insert(wp.id.clone(), self.patterns.len());
                self.patterns.push(wp);
            }
        }
    }

    /// Record one raw line. Returns false when the line normalized to nothing.
    pub fn observe(&mut self, raw: &str) -> bool {
        let raw = raw.trim_end_matches(['\n', '\r']);
        let pattern = normalize_line(raw);
        if pattern.is_empty() {
            return false;
        }
        let id = pattern_hash(&pattern);
        if let Some(&i) = self.index.get(&id) {
            self.patterns[i].count += 1;
            return true;
        }
        let severity = classify(&pattern);
        self.insert(WindowPattern { id, pattern, severity, count: 1, sample: raw.to_string() });
        true
    }
}

impl<'a> IntoIterator for &'a Window {
    type Item = &'a WindowPattern;
    type IntoIter = std::slice::Iter<'a, WindowPattern>;

    fn into_iter(self) -> Self::IntoIter { self.patterns.iter() }
}

impl FromIterator<WindowPattern> for Window {
    fn from_iter<I: IntoIterator<Item = WindowPattern>>(iter: I) -> Self {
        let mut w = Window::new();
        for wp in iter {
            w.insert(wp);
        }
        w
    }
}

/// Normalize, hash and classify every line of a batch.
pub fn cluster<I, S>(lines: I) -> Window
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut window = Window::new();
    let mut skipped = 0usize;
    for line in lines {
        if !window.observe(line.as_ref()) {
            skipped += 1;
        }
    }
    tracing::debug!(patterns = window.len(), lines = window.total_lines(), skipped, "clustered batch");
    window
}
