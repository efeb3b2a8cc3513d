//! User-facing texts, prompt rendering and numeric choice parsing.

use crate::extract::{FileCandidate, SearchResult};

/// Reply when the command is invoked without a subject.
pub const USAGE_HINT: &str = "🎓 Please provide a subject name (e.g., O/L Science, A/L ICT)";
/// Reply when the search yields nothing (or the search page failed).
pub const NO_RESULTS: &str = "❌ No matching past papers found.";
/// Reply to an unusable result choice.
pub const INVALID_SELECTION: &str = "❌ Invalid selection.";
/// Reply when the chosen page has no file links (or failed to load).
pub const NO_FILES: &str = "❌ No files found on the selected page.";
/// Reply to an unusable file choice.
pub const INVALID_FILE_SELECTION: &str = "❌ Invalid file selection.";
/// Reply when the user does not answer in time.
pub const SESSION_EXPIRED: &str =
    "⌛ Selection timed out. Send the command again to start a new search.";
/// Reply when anything escapes the session (transport failures).
pub const GENERIC_FAILURE: &str = "⚠️ Something went wrong while fetching past papers.";

/// Reaction on receipt of the subject query.
pub const REACT_QUERY: &str = "📚";
/// Reaction on receipt of a valid result choice.
pub const REACT_RESULT_CHOICE: &str = "📂";
/// Reaction right before the document is sent.
pub const REACT_DOWNLOADING: &str = "⬇️";
/// Reaction after the document was sent.
pub const REACT_DONE: &str = "✅";

/// MIME type of delivered documents.
pub const DOCUMENT_MIME_TYPE: &str = "application/pdf";

/// Number of items shown for a list of `count` entries.
#[must_use]
pub fn listed_count(count: usize, max_listed: usize) -> usize {
    count.min(max_listed)
}

fn render_numbered<'a>(header: &str, labels: impl Iterator<Item = &'a str>, max: usize) -> String {
    let mut msg = header.to_string();
    for (i, label) in labels.take(max).enumerate() {
        msg.push_str(&format!("{}. {label}\n", i + 1));
    }
    msg
}

/// Prompt listing search results.
#[must_use]
pub fn render_results_prompt(results: &[SearchResult], max_listed: usize) -> String {
    render_numbered(
        "📘 Past Paper Search Results\n\nReply with a number to view available files:\n\n",
        results.iter().map(|r| r.title.as_str()),
        max_listed,
    )
}

/// Prompt listing the files of the chosen result.
#[must_use]
pub fn render_files_prompt(
    selected: &SearchResult,
    files: &[FileCandidate],
    max_listed: usize,
) -> String {
    render_numbered(
        &format!(
            "📄 {} Files\n\nReply with a number to download:\n\n",
            selected.title
        ),
        files.iter().map(|f| f.name.as_str()),
        max_listed,
    )
}

/// Caption attached to a delivered document.
#[must_use]
pub fn render_caption(file: &FileCandidate, subject: &SearchResult, source_label: &str) -> String {
    format!(
        "📝 {}\n📘 Subject: {}\n📎 Source: {source_label}",
        file.name, subject.title
    )
}

/// File name a document is delivered under.
#[must_use]
pub fn document_file_name(file: &FileCandidate) -> String {
    format!("{}.pdf", file.name)
}

/// Parse a 1-based choice out of a reply.
///
/// Returns the 0-based index if the trimmed text is an integer in
/// `[1, listed]`, `None` otherwise.
#[must_use]
pub fn parse_choice(text: Option<&str>, listed: usize) -> Option<usize> {
    let n: i64 = text?.trim().parse().ok()?;
    let n = usize::try_from(n).ok()?;
    (1..=listed).contains(&n).then(|| n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn results(n: usize) -> Vec<SearchResult> {
        (1..=n)
            .map(|i| SearchResult {
                title: format!("Paper {i}"),
                url: format!("https://x/{i}"),
            })
            .collect()
    }

    #[test]
    fn test_results_prompt_numbering() {
        let prompt = render_results_prompt(&results(2), 10);
        assert_eq!(
            prompt,
            "📘 Past Paper Search Results\n\nReply with a number to view available files:\n\n1. Paper 1\n2. Paper 2\n"
        );
    }

    #[test]
    fn test_prompt_never_lists_more_than_max() {
        let prompt = render_results_prompt(&results(25), 10);
        assert!(prompt.contains("10. Paper 10\n"));
        assert!(!prompt.contains("11."));
        assert!(!prompt.contains("Paper 11"));
    }

    #[test]
    fn test_files_prompt_and_caption() {
        let selected = SearchResult {
            title: "Paper A".to_string(),
            url: "https://x/a".to_string(),
        };
        let file = FileCandidate {
            name: "2023 Past Paper".to_string(),
            link: "https://drive.google.com/1".to_string(),
        };
        let prompt = render_files_prompt(&selected, std::slice::from_ref(&file), 10);
        assert_eq!(
            prompt,
            "📄 Paper A Files\n\nReply with a number to download:\n\n1. 2023 Past Paper\n"
        );
        assert_eq!(
            render_caption(&file, &selected, "pastpapers.wiki"),
            "📝 2023 Past Paper\n📘 Subject: Paper A\n📎 Source: pastpapers.wiki"
        );
        assert_eq!(document_file_name(&file), "2023 Past Paper.pdf");
    }

    #[test]
    fn test_parse_choice_rejects_bad_input() {
        assert_eq!(parse_choice(Some("1"), 3), Some(0));
        assert_eq!(parse_choice(Some(" 3 \n"), 3), Some(2));
        assert_eq!(parse_choice(Some("0"), 3), None);
        assert_eq!(parse_choice(Some("-1"), 3), None);
        assert_eq!(parse_choice(Some("4"), 3), None);
        assert_eq!(parse_choice(Some("two"), 3), None);
        assert_eq!(parse_choice(Some("1.5"), 3), None);
        assert_eq!(parse_choice(Some(""), 3), None);
        assert_eq!(parse_choice(None, 3), None);
        assert_eq!(parse_choice(Some("1"), 0), None);
    }

    proptest! {
        #[test]
        fn prop_choice_within_listed_bound(n in -50i64..200, count in 0usize..40) {
            let listed = listed_count(count, 10);
            let text = n.to_string();
            match parse_choice(Some(&text), listed) {
                Some(idx) => {
                    prop_assert!(idx < listed);
                    prop_assert!(listed <= 10);
                    prop_assert_eq!(i64::try_from(idx + 1).ok(), Some(n));
                }
                None => prop_assert!(n < 1 || n > i64::try_from(listed).unwrap_or(i64::MAX)),
            }
        }
    }
}
