//! Outline synchronization library.
//! Keeps tracker records (tasks, tickets, archived documents, calendar events) in sync
//! with hand-edited Logseq-style outline pages without disturbing unrelated content.
//! The text engine (`normalize`, `last_line`, `merge`, `append`) is pure; `storage` and
//! `sync` wrap it with page persistence and change detection.

pub mod core {
    use serde::{Deserialize, Serialize};

    /// Literal prefix that opens a top-level entry.
    pub const ENTRY_PREFIX: &str = "- ";

    pub fn is_entry_start(line: &str) -> bool {
        line.starts_with(ENTRY_PREFIX)
    }

    /// A record rendered for a keyed merge: the full entry text plus the substring
    /// that identifies it inside a page.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct RenderedEntry {
        pub key: String,
        pub text: String,
    }

    /// A record rendered for an append-only page.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AppendEntry {
        /// Distinguishing token searched (case-insensitively) before appending.
        pub token: String,
        pub headline: String,
        /// Nested, collapsed content. Empty means headline only.
        pub body: String,
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, thiserror::Error)]
    pub enum SyncError {
        #[error("source {0:?} is not defined in the configuration")]
        UnknownSource(String),
        #[error("source {source_name:?} refers to unknown graph {graph:?}")]
        UnknownGraph { source_name: String, graph: String },
        #[error("source {0:?} is defined more than once")]
        DuplicateSource(String),
        #[error("source {source_name:?} expects {expected} records, got a {found} record")]
        KindMismatch {
            source_name: String,
            expected: &'static str,
            found: &'static str,
        },
    }
}

pub mod normalize {
    //! Boilerplate stripping for free-text bodies (calendar invites in particular).
    //!
    //! Bodies usually arrive with escaped `\n` tokens instead of real line breaks. The
    //! scanner works on the unescaped form and the result is escaped again.

    /// Marker line that identifies an injected meeting-invite block.
    pub const VENDOR_MARKER: &str = "Microsoft Teams";

    const ESCAPED_BREAK: &str = "\\n";
    const ARTIFACT_RULE_WIDTH: usize = 80;

    /// Remove vendor blocks from `body`. A body without such a block comes back unchanged.
    pub fn normalize(body: &str) -> String {
        let unescaped = body.replace(ESCAPED_BREAK, "\n");
        let stripped = match strip_vendor_blocks(&unescaped, VENDOR_MARKER) {
            Some(cleaned) => cleaned.replace('\n', ESCAPED_BREAK),
            None => body.to_string(),
        };
        stripped.replace(&leftover_artifact(), "")
    }

    /// Delete every `delimiter / marker / ... / delimiter` span. Returns `None` when
    /// nothing was removed.
    pub fn strip_vendor_blocks(text: &str, marker: &str) -> Option<String> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut out = String::with_capacity(text.len());
        let mut removed = false;
        let mut i = 0;
        while i < lines.len() {
            if let Some(end) = block_end(&lines, i, marker) {
                removed = true;
                i = end + 1;
                continue;
            }
            out.push_str(lines[i]);
            i += 1;
        }
        removed.then_some(out)
    }

    fn block_end(lines: &[&str], start: usize, marker: &str) -> Option<usize> {
        if !is_delimiter(lines[start]) {
            return None;
        }
        let marker_line = lines.get(start + 1)?;
        if !without_indent(marker_line).starts_with(marker) {
            return None;
        }
        (start + 2..lines.len()).find(|&j| is_delimiter(lines[j]))
    }

    fn is_delimiter(line: &str) -> bool {
        without_indent(line).starts_with("__")
    }

    fn without_indent(line: &str) -> &str {
        line.trim_start_matches([' ', '\t'])
    }

    /// Rule left behind once the block above it is gone.
    fn leftover_artifact() -> String {
        format!(
            "{ESCAPED_BREAK}{ESCAPED_BREAK}{}",
            "_".repeat(ARTIFACT_RULE_WIDTH)
        )
    }

}

pub mod last_line {
    //! Last-line inspection used to pick the separator before an append.
    //!
    //! Only the tail of the document is examined, so large append-only pages are never
    //! parsed just to decide spacing.

    use std::io::{self, Read, Seek, SeekFrom};

    const CHUNK: u64 = 4096;

    fn is_break(byte: u8) -> bool {
        byte == b'\n' || byte == b'\r'
    }

    /// Shape of a document's tail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Tail {
        /// Zero-length document.
        Empty,
        /// Ends exactly at a line break.
        Break,
        /// Last line is a single stray character.
        Stray,
        /// Last line has content.
        Line,
    }

    impl Tail {
        pub fn classify(doc_len: u64, last_line_len: usize) -> Self {
            match (doc_len, last_line_len) {
                (0, _) => Tail::Empty,
                (_, 0) => Tail::Break,
                (_, 1) => Tail::Stray,
                _ => Tail::Line,
            }
        }

        pub fn separator(self) -> &'static str {
            match self {
                Tail::Empty | Tail::Break => "- ",
                Tail::Stray => " ",
                Tail::Line => "\n- ",
            }
        }
    }

    /// Text after the final `\n` or `\r`, or the whole document if it has none.
    pub fn last_line(doc: &str) -> &str {
        match doc.bytes().rposition(is_break) {
            Some(idx) => &doc[idx + 1..],
            None => doc,
        }
    }

    pub fn separator_for(doc: &str) -> &'static str {
        Tail::classify(doc.len() as u64, last_line(doc).len()).separator()
    }

    /// Read the last line of a seekable resource by scanning fixed-size chunks backward
    /// from its end. The stream position is left unspecified.
    pub fn read_last_line<R: Read + Seek>(reader: &mut R) -> io::Result<Vec<u8>> {
        let mut pos = reader.seek(SeekFrom::End(0))?;
        let mut buf = vec![0u8; CHUNK as usize];
        let mut line: Vec<u8> = Vec::new();
        while pos > 0 {
            let step = CHUNK.min(pos);
            pos -= step;
            reader.seek(SeekFrom::Start(pos))?;
            let chunk = &mut buf[..step as usize];
            reader.read_exact(chunk)?;
            let (head, found) = match chunk.iter().rposition(|&b| is_break(b)) {
                Some(idx) => (&chunk[idx + 1..], true),
                None => (&chunk[..], false),
            };
            let mut joined = head.to_vec();
            joined.extend_from_slice(&line);
            line = joined;
            if found {
                break;
            }
        }
        Ok(line)
    }

    pub fn separator_for_reader<R: Read + Seek>(reader: &mut R) -> io::Result<&'static str> {
        let len = reader.seek(SeekFrom::End(0))?;
        let line = read_last_line(reader)?;
        Ok(Tail::classify(len, line.len()).separator())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Cursor;

        #[test]
        fn separators_follow_the_tail() {
            assert_eq!(separator_for(""), "- ");
            assert_eq!(separator_for("- a\n"), "- ");
            assert_eq!(separator_for("- a\r\n"), "- ");
            assert_eq!(separator_for("-"), " ");
            assert_eq!(separator_for("- a\n-"), " ");
            assert_eq!(separator_for("- text"), "\n- ");
        }

        #[test]
        fn last_line_stops_at_carriage_return() {
            assert_eq!(last_line("one\rtwo"), "two");
            assert_eq!(last_line("single"), "single");
            assert_eq!(last_line("ends\n"), "");
        }

        #[test]
        fn reader_scan_crosses_chunk_boundaries() {
            let long_line = "x".repeat(10_000);
            let text = format!("- first\n- {long_line}");
            let mut cursor = Cursor::new(text.into_bytes());
            let line = read_last_line(&mut cursor).expect("read");
            assert_eq!(line.len(), long_line.len() + 2);
            assert!(line.starts_with(b"- x"));
        }

        #[test]
        fn reader_agrees_with_in_memory_scan() {
            for doc in ["", "\n", "-", "a\nb", "- a\n- bc\n", "lone"] {
                let mut cursor = Cursor::new(doc.as_bytes().to_vec());
                let sep = separator_for_reader(&mut cursor).expect("scan");
                assert_eq!(sep, separator_for(doc), "document {doc:?}");
            }
        }
    }
}

pub mod merge {
    //! Keyed replace-or-insert over outline pages.
    //!
    //! `merge_entry` treats an entry as the `- ` line plus its continuation lines;
    //! `merge_line` works on single physical lines. Both overwrite every match and insert
    //! a new first entry when nothing matches.

    use crate::core::{RenderedEntry, is_entry_start};
    use tracing::warn;

    /// Result of one merge: the new text and how many existing units were overwritten.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MergeOutcome {
        pub text: String,
        pub matches: usize,
    }

    impl MergeOutcome {
        pub fn inserted(&self) -> bool {
            self.matches == 0
        }
    }

    pub fn merge_entry(doc: &str, key: &str, new_entry: &str) -> String {
        merge_entry_outcome(doc, key, new_entry).text
    }

    /// Replace every entry block containing `key` with `new_entry`, or insert it before
    /// the first entry. Blank lines trailing a block separate entries and are kept.
    /// An empty key matches nothing.
    pub fn merge_entry_outcome(doc: &str, key: &str, new_entry: &str) -> MergeOutcome {
        let lines: Vec<&str> = doc.split('\n').collect();
        let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 1);
        let mut first_entry: Option<usize> = None;
        let mut matches = 0;

        let mut i = 0;
        while i < lines.len() {
            if !is_entry_start(lines[i]) {
                out.push(lines[i]);
                i += 1;
                continue;
            }

            let start = i;
            let mut end = i + 1;
            while end < lines.len() && !is_entry_start(lines[end]) {
                end += 1;
            }
            let mut body_end = end;
            while body_end > start + 1 && lines[body_end - 1].trim().is_empty() {
                body_end -= 1;
            }

            first_entry.get_or_insert(out.len());
            let block = &lines[start..body_end];
            if !key.is_empty() && block.join("\n").contains(key) {
                out.push(new_entry);
                matches += 1;
            } else {
                out.extend_from_slice(block);
            }
            out.extend_from_slice(&lines[body_end..end]);
            i = end;
        }

        if matches == 0 {
            let at = first_entry.unwrap_or_else(|| after_last_content(&out));
            out.insert(at, new_entry);
        }

        MergeOutcome {
            text: out.join("\n"),
            matches,
        }
    }

    /// Insertion point for a document without entries: below its last non-blank line.
    fn after_last_content(lines: &[&str]) -> usize {
        lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |idx| idx + 1)
    }

    pub fn merge_line(doc: &str, key: &str, new_line: &str) -> String {
        merge_line_outcome(doc, key, new_line).text
    }

    /// Replace every physical line containing `key`, or prepend `new_line`.
    pub fn merge_line_outcome(doc: &str, key: &str, new_line: &str) -> MergeOutcome {
        let mut matches = 0;
        let mut lines: Vec<&str> = doc
            .split('\n')
            .map(|line| {
                if !key.is_empty() && line.contains(key) {
                    matches += 1;
                    new_line
                } else {
                    line
                }
            })
            .collect();
        if matches == 0 {
            lines.insert(0, new_line);
        }
        MergeOutcome {
            text: lines.join("\n"),
            matches,
        }
    }

    /// Which merger a page uses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MergeStrategy {
        /// Entries span a `- ` line and its continuation lines.
        Block,
        /// Entries are exactly one line.
        Line,
    }

    impl MergeStrategy {
        pub fn apply(self, doc: &str, entry: &RenderedEntry) -> MergeOutcome {
            match self {
                MergeStrategy::Block => merge_entry_outcome(doc, &entry.key, &entry.text),
                MergeStrategy::Line => merge_line_outcome(doc, &entry.key, &entry.text),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct MergeStats {
        pub replaced: usize,
        pub inserted: usize,
        /// Keys that matched more than one existing entry.
        pub duplicate_keys: Vec<String>,
    }

    /// Fold a batch of entries through one merger, in order.
    pub fn merge_all<'a>(
        doc: &str,
        entries: impl IntoIterator<Item = &'a RenderedEntry>,
        strategy: MergeStrategy,
    ) -> (String, MergeStats) {
        let mut text = doc.to_string();
        let mut stats = MergeStats::default();
        for entry in entries {
            let outcome = strategy.apply(&text, entry);
            if outcome.inserted() {
                stats.inserted += 1;
            } else {
                stats.replaced += 1;
            }
            if outcome.matches > 1 {
                warn!(
                    key = %entry.key,
                    matches = outcome.matches,
                    "key matched several entries; all of them were overwritten"
                );
                stats.duplicate_keys.push(entry.key.clone());
            }
            text = outcome.text;
        }
        (text, stats)
    }

}

pub mod append {
    //! Append-only composition for chronological pages (one journal page per day).

    use crate::core::AppendEntry;
    use crate::last_line::separator_for;

    pub const COLLAPSED_MARKER: &str = "collapsed:: true";

    /// Bytes to append after `separator`: the headline and, when present, the body as a
    /// collapsed child.
    pub fn compose_suffix(separator: &str, headline: &str, body: &str) -> String {
        let mut out = String::with_capacity(separator.len() + headline.len() + body.len() + 24);
        out.push_str(separator);
        out.push_str(headline);
        if !body.is_empty() {
            out.push_str("\n  ");
            out.push_str(COLLAPSED_MARKER);
            out.push_str("\n  - ");
            out.push_str(body);
        }
        out
    }

    pub fn append_entry(doc: &str, headline: &str, body: &str) -> String {
        let mut out = doc.to_string();
        out.push_str(&compose_suffix(separator_for(doc), headline, body));
        out
    }

    pub fn contains_ignore_case(doc: &str, token: &str) -> bool {
        doc.to_lowercase().contains(&token.to_lowercase())
    }

    /// `None` when the entry's token already appears anywhere in `doc`.
    pub fn append_if_absent(doc: &str, entry: &AppendEntry) -> Option<String> {
        if contains_ignore_case(doc, &entry.token) {
            return None;
        }
        Some(append_entry(doc, &entry.headline, &entry.body))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn append_spacing() {
            assert_eq!(append_entry("", "headline", ""), "- headline");
            assert_eq!(append_entry("- text\n", "headline", ""), "- text\n- headline");
            assert_eq!(append_entry("- text", "headline", ""), "- text\n- headline");
            assert_eq!(append_entry("-", "headline", ""), "- headline");
        }

        #[test]
        fn body_is_collapsed_child() {
            let out = append_entry("", "*09:00* standup", "agenda\nsecond");
            assert_eq!(
                out,
                "- *09:00* standup\n  collapsed:: true\n  - agenda\nsecond"
            );
        }

        #[test]
        fn existing_token_is_skipped_case_insensitively() {
            let entry = AppendEntry {
                token: "Weekly Sync".into(),
                headline: "[[Weekly Sync]]".into(),
                body: String::new(),
            };
            assert_eq!(append_if_absent("- *10:00* [[weekly sync]]", &entry), None);
            assert_eq!(
                append_if_absent("- other\n", &entry).as_deref(),
                Some("- other\n- [[Weekly Sync]]")
            );
        }
    }
}

pub mod render {
    //! Rendering of normalized tracker records into outline text.

    use crate::core::{AppendEntry, RenderedEntry};
    use crate::normalize::normalize;
    use chrono::{DateTime, FixedOffset, NaiveDate};
    use serde::{Deserialize, Serialize};
    use tracing::warn;

    /* ------------------------------ Task state ------------------------------ */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum TaskState {
        Todo,
        Doing,
        Wait,
        Done,
        Closed,
        Unknown,
    }

    impl TaskState {
        pub fn keyword(self) -> &'static str {
            match self {
                TaskState::Todo => "TODO",
                TaskState::Doing => "DOING",
                TaskState::Wait => "WAIT",
                TaskState::Done => "DONE",
                TaskState::Closed => "CLOSED",
                TaskState::Unknown => "UNKNOWN",
            }
        }

        /// Workflow status names used by issue trackers (English and German workflows).
        pub fn from_tracker_status(status: &str) -> Self {
            match status {
                "Open" | "To Do" | "Pending" | "Reopened" | "Zu erledigen" => TaskState::Todo,
                "In Arbeit" | "In Progress" => TaskState::Doing,
                "Escalated"
                | "Waiting for approval"
                | "Waiting for customer"
                | "Waiting for support"
                | "Warten" => TaskState::Wait,
                "Canceled" | "Closed" => TaskState::Closed,
                "Done" | "Completed" | "Resolved" => TaskState::Done,
                _ => TaskState::Unknown,
            }
        }

        /// Cloud ALM status codes (`CIP<type><state>`).
        pub fn from_cloud_alm_status(code: &str) -> Self {
            match code {
                "CIPTKOPEN" | "CIPUSOPEN" | "CIPREQUOPEN" | "CIPDFCTOPEN" => TaskState::Todo,
                "CIPTKINP" | "CIPUSINP" | "CIPREQUINP" | "CIPDFCTINP" => TaskState::Doing,
                "CIPTKBLK" | "CIPUSBLK" | "CIPREQUBLK" | "CIPDFCTBLK" => TaskState::Wait,
                "CIPTKNO" | "CIPUSNO" | "CIPREQUNO" => TaskState::Closed,
                "CIPTKCLOSE" | "CIPUSCLOSE" | "CIPREQUCLOSE" | "CIPDFCTDONE" => TaskState::Done,
                _ => TaskState::Unknown,
            }
        }

        pub fn from_gitlab_state(state: &str) -> Self {
            match state {
                "opened" => TaskState::Todo,
                "closed" => TaskState::Done,
                _ => TaskState::Unknown,
            }
        }
    }

    /* ------------------------------- Priority ------------------------------- */

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum Priority {
        A,
        B,
        C,
        D,
    }

    impl Priority {
        pub fn marker(self) -> &'static str {
            match self {
                Priority::A => "[#A]",
                Priority::B => "[#B]",
                Priority::C => "[#C]",
                Priority::D => "[#D]",
            }
        }

        /// Ranks 1..=4; anything else falls back to B.
        pub fn from_rank(rank: i64) -> Self {
            match rank {
                1 => Priority::A,
                3 => Priority::C,
                4 => Priority::D,
                _ => Priority::B,
            }
        }

        pub fn from_tracker_name(name: &str) -> Self {
            let rank = match name {
                "Highest" | "High" => 1,
                "Medium" => 2,
                "Low" => 3,
                "Lowest" => 4,
                _ => 0,
            };
            Self::from_rank(rank)
        }

        pub fn from_cloud_alm_id(id: i64) -> Option<Self> {
            match id {
                10 => Some(Priority::A),
                20 => Some(Priority::B),
                30 => Some(Priority::C),
                40 => Some(Priority::D),
                _ => None,
            }
        }

        /// First `priority::N ` scoped label wins.
        pub fn from_gitlab_labels(labels: &[String]) -> Option<Self> {
            labels.iter().find_map(|label| {
                let rest = label.strip_prefix("priority::")?;
                let (rank, _) = rest.split_once(' ')?;
                match rank {
                    "1" => Some(Priority::A),
                    "2" => Some(Priority::B),
                    "3" => Some(Priority::C),
                    "4" => Some(Priority::D),
                    _ => None,
                }
            })
        }
    }

    /* --------------------------------- Dates --------------------------------- */

    fn parse_day(date: &str) -> Option<NaiveDate> {
        match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
            Ok(day) => Some(day),
            Err(err) => {
                warn!(date, %err, "cannot parse date; field omitted");
                None
            }
        }
    }

    /// `SCHEDULED: <2025-02-03 Mon>`, or an empty string for a malformed date.
    pub fn scheduled(date: &str) -> String {
        parse_day(date)
            .map(|day| format!("SCHEDULED: <{}>", day.format("%Y-%m-%d %a")))
            .unwrap_or_default()
    }

    /// Journal page link `[[03-02-2025]]`, or an empty string for a malformed date.
    pub fn journal_link(date: &str) -> String {
        parse_day(date)
            .map(|day| day.format("[[%d-%m-%Y]]").to_string())
            .unwrap_or_default()
    }

    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /* --------------------------------- Tasks --------------------------------- */

    /// Issue-tracker task, rendered as a multi-line entry keyed by `[[id]]`.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Task {
        pub id: String,
        /// Configured source name; used in the `Project::` link.
        #[serde(default)]
        pub source: String,
        pub state: TaskState,
        #[serde(default)]
        pub priority: Option<Priority>,
        #[serde(default)]
        pub project: Option<String>,
        pub title: String,
        #[serde(default)]
        pub url: Option<String>,
        #[serde(default)]
        pub tags: Vec<String>,
        /// `YYYY-MM-DD`
        #[serde(default)]
        pub due_date: Option<String>,
    }

    impl Task {
        pub fn search_key(&self) -> String {
            format!("[[{}]]", self.id)
        }

        pub fn render(&self) -> RenderedEntry {
            let key = self.search_key();
            let mut text = format!("- {}", self.state.keyword());
            if let Some(priority) = self.priority {
                text.push(' ');
                text.push_str(priority.marker());
            }
            text.push(' ');
            text.push_str(&key);
            match non_empty(&self.url) {
                Some(url) => text.push_str(&format!(" [{}]({})", self.title, url)),
                None => {
                    text.push(' ');
                    text.push_str(&self.title);
                }
            }
            if let Some(project) = non_empty(&self.project) {
                text.push_str(&format!("\n  Project:: [[{}@{}]]", project, self.source));
            }
            if !self.tags.is_empty() {
                text.push_str("\n  tags:: ");
                text.push_str(&self.tags.join(", "));
            }
            if let Some(due) = non_empty(&self.due_date) {
                let planning = scheduled(due);
                if !planning.is_empty() {
                    text.push_str("\n  ");
                    text.push_str(&planning);
                }
            }
            RenderedEntry { key, text }
        }
    }

    /* -------------------------------- Tickets -------------------------------- */

    /// GitLab-style ticket, rendered as a single line keyed by `project [#iid]`.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Ticket {
        pub project: String,
        pub iid: u64,
        pub state: TaskState,
        #[serde(default)]
        pub priority: Option<Priority>,
        /// Optional hashtag grouping tickets of one configured project.
        #[serde(default)]
        pub group: Option<String>,
        pub url: String,
        pub title: String,
        #[serde(default)]
        pub labels: Vec<String>,
        #[serde(default)]
        pub milestone: Option<String>,
        #[serde(default)]
        pub assignee: Option<String>,
        #[serde(default)]
        pub closed_at: Option<DateTime<FixedOffset>>,
    }

    impl Ticket {
        pub fn search_key(&self) -> String {
            format!("{} [#{}]", self.project, self.iid)
        }

        pub fn render(&self) -> RenderedEntry {
            let key = self.search_key();
            let mut text = format!("- {} ", self.state.keyword());
            if let Some(priority) = self
                .priority
                .or_else(|| Priority::from_gitlab_labels(&self.labels))
            {
                text.push_str(priority.marker());
                text.push(' ');
            }
            if let Some(group) = non_empty(&self.group) {
                text.push_str(&format!("#{group} "));
            }
            text.push_str(&format!("{}({}) {}", key, self.url, self.title));
            for label in &self.labels {
                text.push_str(&format!(" [[{label}]]"));
            }
            if let Some(milestone) = non_empty(&self.milestone) {
                text.push_str(&format!(" [[Milestone:: {milestone}]]"));
            }
            if let Some(assignee) = non_empty(&self.assignee) {
                text.push_str(&format!(" [[Assignee:: {assignee}]]"));
            }
            if let Some(closed) = self.closed_at {
                text.push_str(&format!(
                    " completed:: {}",
                    closed.format("[[%m-%d-%Y]] *%H:%M*")
                ));
            }
            RenderedEntry { key, text }
        }
    }

    /* ------------------------------- Documents ------------------------------- */

    /// Archived document, listed one line per document on its correspondent's page.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ArchivedDocument {
        pub id: u64,
        pub title: String,
        /// `YYYY-MM-DD`
        pub created_date: String,
        #[serde(default)]
        pub document_type: Option<String>,
        #[serde(default)]
        pub correspondent: String,
        #[serde(default)]
        pub tags: Vec<String>,
        /// Archive web root, e.g. `https://archive.example.com/`.
        pub base_url: String,
    }

    impl ArchivedDocument {
        pub fn link(&self) -> String {
            format!(
                "[{}]({}/documents/{}/)",
                self.title,
                self.base_url.trim_end_matches('/'),
                self.id
            )
        }

        pub fn render_line(&self) -> String {
            let mut parts = Vec::with_capacity(3 + self.tags.len());
            let created = journal_link(&self.created_date);
            if !created.is_empty() {
                parts.push(created);
            }
            if let Some(kind) = non_empty(&self.document_type) {
                parts.push(format!("[[{kind}]]"));
            }
            parts.push(self.link());
            parts.extend(self.tags.iter().map(|tag| format!("[[{tag}]]")));
            format!("- {}", parts.join(" "))
        }
    }

    /* -------------------------------- Events -------------------------------- */

    /// Calendar event appended to the journal page of its start day.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CalendarEvent {
        pub calendar: String,
        #[serde(default)]
        pub icon: Option<String>,
        pub summary: String,
        pub start: DateTime<FixedOffset>,
        #[serde(default)]
        pub description: String,
    }

    impl CalendarEvent {
        pub fn journal_day(&self) -> NaiveDate {
            self.start.date_naive()
        }

        pub fn render(&self) -> AppendEntry {
            let mut headline = String::new();
            if let Some(icon) = non_empty(&self.icon) {
                headline.push_str(&format!("{{{{i {icon}}}}} "));
            }
            headline.push_str(&format!(
                "*{}* [[{}]]: [[{}]]",
                self.start.format("%H:%M"),
                self.calendar,
                self.summary
            ));
            AppendEntry {
                token: self.summary.clone(),
                headline,
                body: normalize(&self.description).replace("\\n", "\n"),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn task() -> Task {
            Task {
                id: "OPS-7".into(),
                source: "work".into(),
                state: TaskState::from_tracker_status("In Progress"),
                priority: Some(Priority::from_tracker_name("High")),
                project: Some("Operations".into()),
                title: "Rotate certificates".into(),
                url: Some("https://tracker.example.com/browse/OPS-7".into()),
                tags: vec!["[[infra]]".into(), "[[security]]".into()],
                due_date: Some("2025-02-03".into()),
            }
        }

        #[test]
        fn task_renders_properties_block() {
            let entry = task().render();
            assert_eq!(entry.key, "[[OPS-7]]");
            assert_eq!(
                entry.text,
                "- DOING [#A] [[OPS-7]] [Rotate certificates](https://tracker.example.com/browse/OPS-7)\n  Project:: [[Operations@work]]\n  tags:: [[infra]], [[security]]\n  SCHEDULED: <2025-02-03 Mon>"
            );
        }

        #[test]
        fn malformed_due_date_is_omitted() {
            let mut t = task();
            t.due_date = Some("03.02.2025".into());
            t.url = None;
            t.tags.clear();
            t.project = None;
            assert_eq!(t.render().text, "- DOING [#A] [[OPS-7]] Rotate certificates");
            assert_eq!(scheduled("not a date"), "");
        }

        #[test]
        fn status_and_priority_tables() {
            assert_eq!(TaskState::from_tracker_status("Warten"), TaskState::Wait);
            assert_eq!(TaskState::from_tracker_status("Resolved"), TaskState::Done);
            assert_eq!(TaskState::from_tracker_status("Triage"), TaskState::Unknown);
            assert_eq!(TaskState::from_cloud_alm_status("CIPUSBLK"), TaskState::Wait);
            assert_eq!(TaskState::from_cloud_alm_status("CIPREQUNO"), TaskState::Closed);
            assert_eq!(TaskState::from_gitlab_state("closed"), TaskState::Done);
            assert_eq!(Priority::from_rank(0), Priority::B);
            assert_eq!(Priority::from_tracker_name("Lowest"), Priority::D);
            assert_eq!(Priority::from_cloud_alm_id(30), Some(Priority::C));
            assert_eq!(Priority::from_cloud_alm_id(99), None);
            let labels = vec!["bug".to_string(), "priority::2 normal".to_string()];
            assert_eq!(Priority::from_gitlab_labels(&labels), Some(Priority::B));
        }

        #[test]
        fn ticket_is_one_line() {
            let ticket = Ticket {
                project: "backend".into(),
                iid: 42,
                state: TaskState::from_gitlab_state("closed"),
                priority: None,
                group: Some("platform".into()),
                url: "https://git.example.com/backend/-/issues/42".into(),
                title: "Fix login".into(),
                labels: vec!["priority::1 urgent".into()],
                milestone: Some("v2".into()),
                assignee: Some("kim".into()),
                closed_at: DateTime::parse_from_rfc3339("2025-01-05T14:30:00+01:00").ok(),
            };
            let entry = ticket.render();
            assert_eq!(entry.key, "backend [#42]");
            assert_eq!(
                entry.text,
                "- DONE [#A] #platform backend [#42](https://git.example.com/backend/-/issues/42) Fix login [[priority::1 urgent]] [[Milestone:: v2]] [[Assignee:: kim]] completed:: [[01-05-2025]] *14:30*"
            );
            assert!(!entry.text.contains('\n'));
        }

        #[test]
        fn document_line_links_to_archive() {
            let doc = ArchivedDocument {
                id: 311,
                title: "Invoice March".into(),
                created_date: "2024-03-28".into(),
                document_type: Some("Invoice".into()),
                correspondent: "Power Co".into(),
                tags: vec!["bills".into()],
                base_url: "https://archive.example.com/".into(),
            };
            assert_eq!(
                doc.render_line(),
                "- [[28-03-2024]] [[Invoice]] [Invoice March](https://archive.example.com/documents/311/) [[bills]]"
            );
        }

        #[test]
        fn event_headline_and_cleaned_body() {
            let rule = "_".repeat(80);
            let event = CalendarEvent {
                calendar: "Work".into(),
                icon: Some("calendar".into()),
                summary: "Planning".into(),
                start: DateTime::parse_from_rfc3339("2025-02-03T09:15:00+01:00").expect("time"),
                description: format!(
                    "Scope review\\n{rule}\\nMicrosoft Teams meeting\\nJoin\\n{rule}\\n"
                ),
            };
            let entry = event.render();
            assert_eq!(entry.headline, "{{i calendar}} *09:15* [[Work]]: [[Planning]]");
            assert_eq!(entry.body, "Scope review\n");
            assert_eq!(entry.token, "Planning");
            assert_eq!(event.journal_day(), NaiveDate::from_ymd_opt(2025, 2, 3).unwrap());
        }
    }
}

pub mod record {
    //! Records handed over by external fetchers, as a tagged JSON array.

    use crate::render::{ArchivedDocument, CalendarEvent, Task, Ticket};
    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};
    use std::{fs, path::Path};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    pub enum Record {
        Task(Task),
        Ticket(Ticket),
        Document(ArchivedDocument),
        Event(CalendarEvent),
    }

    impl Record {
        pub fn kind_name(&self) -> &'static str {
            match self {
                Record::Task(_) => "task",
                Record::Ticket(_) => "ticket",
                Record::Document(_) => "document",
                Record::Event(_) => "event",
            }
        }
    }

    pub fn parse_records(json: &str) -> serde_json::Result<Vec<Record>> {
        serde_json::from_str(json)
    }

    pub fn load_records(path: &Path) -> Result<Vec<Record>> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        parse_records(&text).with_context(|| format!("decoding records in {:?}", path))
    }

}

pub mod config {
    //! Run configuration: which graphs exist and which sources feed them.
    //! Passed explicitly to every operation that needs it.

    use crate::core::SyncError;
    use anyhow::{Context, Result};
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::{
        collections::BTreeSet,
        fs,
        path::{Path, PathBuf},
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum SourceKind {
        Tasks,
        Tickets,
        Documents,
        Calendar,
    }

    impl SourceKind {
        /// Record kind this source accepts.
        pub fn record_kind(self) -> &'static str {
            match self {
                SourceKind::Tasks => "task",
                SourceKind::Tickets => "ticket",
                SourceKind::Documents => "document",
                SourceKind::Calendar => "event",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SourceConfig {
        pub name: String,
        pub graph: String,
        pub kind: SourceKind,
        /// Page stem override; defaults depend on the kind.
        #[serde(default)]
        pub page: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct Config {
        /// Graph name → graph root directory.
        pub graphs: IndexMap<String, PathBuf>,
        #[serde(default)]
        pub sources: Vec<SourceConfig>,
    }

    impl Config {
        pub fn from_json(text: &str) -> Result<Self> {
            let config: Config = serde_json::from_str(text).context("decoding configuration")?;
            config.validate()?;
            Ok(config)
        }

        /// Load `path`; relative graph roots resolve against the file's directory.
        pub fn load(path: &Path) -> Result<Self> {
            let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            let mut config =
                Self::from_json(&text).with_context(|| format!("loading {:?}", path))?;
            if let Some(base) = path.parent() {
                for root in config.graphs.values_mut() {
                    if root.is_relative() {
                        *root = base.join(&*root);
                    }
                }
            }
            Ok(config)
        }

        pub fn validate(&self) -> Result<(), SyncError> {
            let mut names = BTreeSet::new();
            for source in &self.sources {
                if !names.insert(source.name.as_str()) {
                    return Err(SyncError::DuplicateSource(source.name.clone()));
                }
                if !self.graphs.contains_key(&source.graph) {
                    return Err(SyncError::UnknownGraph {
                        source_name: source.name.clone(),
                        graph: source.graph.clone(),
                    });
                }
            }
            Ok(())
        }

        pub fn source(&self, name: &str) -> Result<&SourceConfig, SyncError> {
            self.sources
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| SyncError::UnknownSource(name.to_string()))
        }

        pub fn graph_root(&self, source: &SourceConfig) -> Result<&Path, SyncError> {
            self.graphs
                .get(&source.graph)
                .map(PathBuf::as_path)
                .ok_or_else(|| SyncError::UnknownGraph {
                    source_name: source.name.clone(),
                    graph: source.graph.clone(),
                })
        }
    }

}

pub mod pages {
    //! Page paths inside a graph, relative to its root.

    use crate::config::SourceConfig;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    /// File-safe stem: alphanumerics, `-`, `_` and `.` survive, everything else collapses
    /// into single dashes.
    pub fn sanitize_stem(name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        for ch in name.trim().chars() {
            if ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                out.push(ch);
            } else if !out.ends_with('-') {
                out.push('-');
            }
        }
        let trimmed = out.trim_matches('-');
        if trimmed.is_empty() {
            "unknown".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn stem(source: &SourceConfig) -> &str {
        source.page.as_deref().unwrap_or(&source.name)
    }

    pub fn task_page(source: &SourceConfig) -> PathBuf {
        PathBuf::from(format!("pages/{}.md", stem(source)))
    }

    pub fn ticket_page(source: &SourceConfig) -> PathBuf {
        match source.page.as_deref() {
            Some(project) => PathBuf::from(format!("pages/gitlab___{project}___tickets.md")),
            None => PathBuf::from("pages/gitlab___tickets.md"),
        }
    }

    pub fn document_page(source: &SourceConfig, correspondent: &str) -> PathBuf {
        PathBuf::from(format!(
            "pages/documents___paperless___{}___{}.md",
            stem(source),
            sanitize_stem(correspondent)
        ))
    }

    pub fn journal_page(day: NaiveDate) -> PathBuf {
        PathBuf::from(format!("journals/{}.md", day.format("%Y_%m_%d")))
    }

}

pub mod storage {
    //! Page persistence. Writes happen only when content actually changed.

    use crate::append::{compose_suffix, contains_ignore_case};
    use crate::core::AppendEntry;
    use crate::last_line::separator_for_reader;
    use anyhow::{Context, Result};
    use std::{
        fs::{self, OpenOptions},
        io::{self, Read, Write},
        path::{Path, PathBuf},
    };
    use tracing::{debug, info};

    /// Where pages live. Paths are relative to the store's graph root.
    pub trait PageStore {
        /// Current page text; a missing page reads as empty.
        fn read(&self, page: &Path) -> Result<String>;

        /// Persist `content` if it differs from the stored bytes. Returns whether a write
        /// happened.
        fn write_if_changed(&self, page: &Path, content: &str) -> Result<bool>;

        /// Append `entry` unless its token already occurs in the page. Returns whether
        /// bytes were appended.
        fn append_if_absent(&self, page: &Path, entry: &AppendEntry) -> Result<bool>;
    }

    #[derive(Debug, Clone)]
    pub struct FsPageStore {
        root: PathBuf,
    }

    impl FsPageStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        pub fn abs_path(&self, page: &Path) -> PathBuf {
            self.root.join(page)
        }

        fn ensure_parent(path: &Path) -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
            }
            Ok(())
        }
    }

    impl PageStore for FsPageStore {
        fn read(&self, page: &Path) -> Result<String> {
            let path = self.abs_path(page);
            match fs::read_to_string(&path) {
                Ok(text) => Ok(text),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
                Err(err) => Err(err).with_context(|| format!("reading {:?}", path)),
            }
        }

        fn write_if_changed(&self, page: &Path, content: &str) -> Result<bool> {
            let old = self.read(page)?;
            let path = self.abs_path(page);
            if old == content {
                debug!(path = %path.display(), "page unchanged");
                return Ok(false);
            }
            Self::ensure_parent(&path)?;
            fs::write(&path, content.as_bytes()).with_context(|| format!("writing {:?}", path))?;
            info!(path = %path.display(), "page changed");
            Ok(true)
        }

        fn append_if_absent(&self, page: &Path, entry: &AppendEntry) -> Result<bool> {
            let path = self.abs_path(page);
            Self::ensure_parent(&path)?;
            let mut file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(&path)
                .with_context(|| format!("opening {:?}", path))?;

            let mut existing = String::new();
            file.read_to_string(&mut existing)
                .with_context(|| format!("reading {:?}", path))?;
            if contains_ignore_case(&existing, &entry.token) {
                debug!(path = %path.display(), token = %entry.token, "entry already present");
                return Ok(false);
            }

            let separator = separator_for_reader(&mut file)
                .with_context(|| format!("inspecting last line of {:?}", path))?;
            let suffix = compose_suffix(separator, &entry.headline, &entry.body);
            file.write_all(suffix.as_bytes())
                .with_context(|| format!("appending to {:?}", path))?;
            info!(path = %path.display(), token = %entry.token, "entry appended");
            Ok(true)
        }
    }

}

pub mod projectors {
    pub mod archive_projector {
        //! Projects archived documents into one page per correspondent.

        use crate::render::ArchivedDocument;
        use indexmap::IndexMap;

        /// Correspondent → full page text, in first-seen order.
        pub fn project_pages<'a>(
            documents: impl IntoIterator<Item = &'a ArchivedDocument>,
        ) -> IndexMap<String, String> {
            let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
            for doc in documents {
                grouped
                    .entry(doc.correspondent.clone())
                    .or_default()
                    .push(doc.render_line());
            }
            grouped
                .into_iter()
                .map(|(correspondent, lines)| {
                    let text = page_text(&correspondent, &lines);
                    (correspondent, text)
                })
                .collect()
        }

        pub fn page_text(correspondent: &str, lines: &[String]) -> String {
            let mut out = format!("- Alias:: {correspondent}");
            for line in lines {
                out.push('\n');
                out.push_str(line);
            }
            out
        }

        #[cfg(test)]
        mod tests {
            use super::*;

            fn doc(id: u64, correspondent: &str) -> ArchivedDocument {
                ArchivedDocument {
                    id,
                    title: format!("Doc {id}"),
                    created_date: "2024-01-02".into(),
                    document_type: None,
                    correspondent: correspondent.into(),
                    tags: vec![],
                    base_url: "https://a.example".into(),
                }
            }

            #[test]
            fn groups_by_correspondent_in_order() {
                let docs = [doc(1, "Bank"), doc(2, "Insurer"), doc(3, "Bank")];
                let pages = project_pages(&docs);
                let keys: Vec<&str> = pages.keys().map(String::as_str).collect();
                assert_eq!(keys, ["Bank", "Insurer"]);
                assert_eq!(
                    pages["Bank"],
                    "- Alias:: Bank\n- [[02-01-2024]] [Doc 1](https://a.example/documents/1/)\n- [[02-01-2024]] [Doc 3](https://a.example/documents/3/)"
                );
            }
        }
    }
}

pub mod sync {
    //! One synchronization run for a configured source.

    use crate::append::append_if_absent;
    use crate::config::{Config, SourceConfig, SourceKind};
    use crate::core::{RenderedEntry, SyncError};
    use crate::merge::{MergeStrategy, merge_all};
    use crate::pages;
    use crate::projectors::archive_projector;
    use crate::record::Record;
    use crate::render::{ArchivedDocument, CalendarEvent, Task, Ticket};
    use crate::storage::{FsPageStore, PageStore};
    use anyhow::Result;
    use serde::Serialize;
    use std::path::Path;
    use tracing::{debug, info};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct SyncOptions {
        /// Compute everything, write nothing.
        pub dry_run: bool,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
    pub struct SyncReport {
        pub pages_written: usize,
        pub pages_unchanged: usize,
        pub entries_replaced: usize,
        pub entries_inserted: usize,
        pub entries_appended: usize,
        pub entries_skipped: usize,
        pub duplicate_keys: Vec<String>,
    }

    /// Resolve `source_name` in `config` and sync `records` into its graph on disk.
    pub fn run_source(
        config: &Config,
        source_name: &str,
        records: &[Record],
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let source = config.source(source_name)?;
        let store = FsPageStore::new(config.graph_root(source)?);
        info!(source = %source.name, records = records.len(), "syncing source");
        sync_records(source, records, &store, options)
    }

    pub fn sync_records<S: PageStore>(
        source: &SourceConfig,
        records: &[Record],
        store: &S,
        options: SyncOptions,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        match source.kind {
            SourceKind::Tasks => {
                let tasks = pick(source, records, |r| match r {
                    Record::Task(t) => Some(t),
                    _ => None,
                })?;
                let entries: Vec<RenderedEntry> =
                    tasks.into_iter().map(|t| task_for(source, t).render()).collect();
                merge_page(
                    store,
                    &pages::task_page(source),
                    &entries,
                    MergeStrategy::Block,
                    options,
                    &mut report,
                )?;
            }
            SourceKind::Tickets => {
                let tickets = pick(source, records, |r| match r {
                    Record::Ticket(t) => Some(t),
                    _ => None,
                })?;
                let entries: Vec<RenderedEntry> =
                    tickets.into_iter().map(Ticket::render).collect();
                merge_page(
                    store,
                    &pages::ticket_page(source),
                    &entries,
                    MergeStrategy::Line,
                    options,
                    &mut report,
                )?;
            }
            SourceKind::Documents => {
                let documents: Vec<&ArchivedDocument> = pick(source, records, |r| match r {
                    Record::Document(d) => Some(d),
                    _ => None,
                })?;
                for (correspondent, text) in archive_projector::project_pages(documents) {
                    let page = pages::document_page(source, &correspondent);
                    let original = store.read(&page)?;
                    persist(store, &page, &original, &text, options, &mut report)?;
                }
            }
            SourceKind::Calendar => {
                let events: Vec<&CalendarEvent> = pick(source, records, |r| match r {
                    Record::Event(e) => Some(e),
                    _ => None,
                })?;
                for event in events {
                    append_event(store, event, options, &mut report)?;
                }
            }
        }
        Ok(report)
    }

    fn pick<'a, T>(
        source: &SourceConfig,
        records: &'a [Record],
        select: impl Fn(&'a Record) -> Option<&'a T>,
    ) -> Result<Vec<&'a T>, SyncError> {
        records
            .iter()
            .map(|record| {
                select(record).ok_or_else(|| SyncError::KindMismatch {
                    source_name: source.name.clone(),
                    expected: source.kind.record_kind(),
                    found: record.kind_name(),
                })
            })
            .collect()
    }

    fn task_for(source: &SourceConfig, task: &Task) -> Task {
        let mut task = task.clone();
        if task.source.is_empty() {
            task.source = source.name.clone();
        }
        task
    }

    fn merge_page<S: PageStore>(
        store: &S,
        page: &Path,
        entries: &[RenderedEntry],
        strategy: MergeStrategy,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let original = store.read(page)?;
        let (text, stats) = merge_all(&original, entries, strategy);
        report.entries_replaced += stats.replaced;
        report.entries_inserted += stats.inserted;
        report.duplicate_keys.extend(stats.duplicate_keys);
        persist(store, page, &original, &text, options, report)
    }

    fn persist<S: PageStore>(
        store: &S,
        page: &Path,
        original: &str,
        updated: &str,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let changed = if options.dry_run {
            let changed = original != updated;
            if changed {
                info!(page = %page.display(), "dry run: page would change");
            }
            changed
        } else {
            store.write_if_changed(page, updated)?
        };
        if changed {
            report.pages_written += 1;
        } else {
            report.pages_unchanged += 1;
        }
        Ok(())
    }

    fn append_event<S: PageStore>(
        store: &S,
        event: &CalendarEvent,
        options: SyncOptions,
        report: &mut SyncReport,
    ) -> Result<()> {
        let page = pages::journal_page(event.journal_day());
        let entry = event.render();
        let appended = if options.dry_run {
            append_if_absent(&store.read(&page)?, &entry).is_some()
        } else {
            store.append_if_absent(&page, &entry)?
        };
        if appended {
            report.entries_appended += 1;
        } else {
            debug!(page = %page.display(), summary = %event.summary, "event already in journal");
            report.entries_skipped += 1;
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::render::TaskState;

        fn source(kind: SourceKind) -> SourceConfig {
            SourceConfig {
                name: "work".into(),
                graph: "g".into(),
                kind,
                page: None,
            }
        }

        fn task(id: &str, state: TaskState) -> Record {
            Record::Task(Task {
                id: id.into(),
                source: String::new(),
                state,
                priority: None,
                project: Some("Ops".into()),
                title: format!("task {id}"),
                url: None,
                tags: vec![],
                due_date: None,
            })
        }

        #[test]
        fn tasks_merge_into_existing_page() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let store = FsPageStore::new(tmp.path());
            let page = pages::task_page(&source(SourceKind::Tasks));
            store
                .write_if_changed(&page, "- TODO [[T-1]] task T-1\n  my note\n- personal item\n")
                .expect("seed");

            let records = [task("T-1", TaskState::Done), task("T-2", TaskState::Todo)];
            let report = sync_records(
                &source(SourceKind::Tasks),
                &records,
                &store,
                SyncOptions::default(),
            )
            .expect("sync");

            assert_eq!(report.entries_replaced, 1);
            assert_eq!(report.entries_inserted, 1);
            assert_eq!(report.pages_written, 1);
            assert_eq!(
                store.read(&page).expect("read"),
                "- TODO [[T-2]] task T-2\n  Project:: [[Ops@work]]\n- DONE [[T-1]] task T-1\n  Project:: [[Ops@work]]\n- personal item\n"
            );

            let again = sync_records(
                &source(SourceKind::Tasks),
                &records,
                &store,
                SyncOptions::default(),
            )
            .expect("second sync");
            assert_eq!(again.pages_written, 0);
            assert_eq!(again.pages_unchanged, 1);
        }

        #[test]
        fn dry_run_leaves_disk_alone() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let store = FsPageStore::new(tmp.path());
            let report = sync_records(
                &source(SourceKind::Tasks),
                &[task("T-1", TaskState::Todo)],
                &store,
                SyncOptions { dry_run: true },
            )
            .expect("sync");
            assert_eq!(report.pages_written, 1);
            assert!(!tmp.path().join("pages/work.md").exists());
        }

        #[test]
        fn wrong_record_kind_is_rejected() {
            let tmp = tempfile::tempdir().expect("tempdir");
            let store = FsPageStore::new(tmp.path());
            let err = sync_records(
                &source(SourceKind::Tickets),
                &[task("T-1", TaskState::Todo)],
                &store,
                SyncOptions::default(),
            )
            .expect_err("mismatch");
            assert!(err.to_string().contains("expects ticket records"));
        }
    }
}
