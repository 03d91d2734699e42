use crate::extract::TextExtractor;
use crate::fragment::{Fragment, Heading};
use std::num::NonZeroUsize;

/// Assigns each heading the first page whose extracted text contains a line
/// equal to the heading text.
///
/// Pages are scanned from page 1 upward and lines top to bottom. A line
/// resolves at most one heading: the earliest pending one (in document order)
/// with identical text. Headings that never match stay unresolved.
pub fn locate_headings<S: AsRef<str>>(pages: &[S], headings: &mut [Heading]) -> usize {
    let mut pending: Vec<usize> = (0..headings.len())
        .filter(|idx| !headings[*idx].is_resolved())
        .collect();
    let mut resolved = 0usize;

    let lines = pages.iter().enumerate().flat_map(|(idx0, text)| {
        text.as_ref()
            .split('\n')
            .map(move |line| (idx0 + 1, line.trim()))
    });

    for (page_number, line) in lines {
        if pending.is_empty() {
            break;
        }
        let Some(slot) = pending
            .iter()
            .position(|idx| headings[*idx].text == line)
        else {
            continue;
        };
        let Some(page) = NonZeroUsize::new(page_number) else {
            continue;
        };
        let idx = pending.remove(slot);
        if headings[idx].resolve(page) {
            resolved += 1;
        }
    }

    resolved
}

/// Runs the locator over one body fragment. Extraction failures are logged
/// and leave every heading of the fragment unresolved.
pub fn resolve_fragment_headings(mut fragment: Fragment, extractor: &dyn TextExtractor) -> Fragment {
    if fragment.headings.is_empty() {
        return fragment;
    }
    let Some(location) = fragment.location.as_deref() else {
        return fragment;
    };
    match extractor.extract_pages(location) {
        Ok(pages) => {
            let resolved = locate_headings(&pages, &mut fragment.headings);
            log::debug!(
                "{}: resolved {resolved}/{} headings over {} pages",
                fragment.kind.label(),
                fragment.headings.len(),
                pages.len()
            );
        }
        Err(err) => {
            log::warn!(
                "{}: {err}; table of contents falls back to estimated pages",
                fragment.kind.label()
            );
        }
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FolioError;
    use crate::fragment::{FragmentKind, HeadingLevel, HeadingPage};
    use std::path::{Path, PathBuf};

    fn headings(texts: &[&str]) -> Vec<Heading> {
        texts
            .iter()
            .map(|t| Heading::new(HeadingLevel::H1, t))
            .collect()
    }

    fn pages_of(headings: &[Heading]) -> Vec<Option<usize>> {
        headings.iter().map(|h| h.page().page()).collect()
    }

    struct FixedPages(Vec<String>);

    impl TextExtractor for FixedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<String>, FolioError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl TextExtractor for Failing {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FolioError> {
            Err(FolioError::Extraction {
                path: path.to_path_buf(),
                message: "broken".to_string(),
            })
        }
    }

    #[test]
    fn headings_resolve_to_first_page_containing_their_line() {
        let pages = ["Intro\nsome text", "more\n  Background  \n", "Results"];
        let mut hs = headings(&["Intro", "Background", "Results"]);
        assert_eq!(locate_headings(&pages, &mut hs), 3);
        assert_eq!(pages_of(&hs), vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn substring_matches_do_not_count() {
        let pages = ["An Intro to things"];
        let mut hs = headings(&["Intro"]);
        assert_eq!(locate_headings(&pages, &mut hs), 0);
        assert_eq!(hs[0].page(), HeadingPage::Unresolved);
    }

    #[test]
    fn duplicate_texts_resolve_in_document_order() {
        let pages = ["Usage", "text", "Usage"];
        let mut hs = headings(&["Usage", "Usage"]);
        locate_headings(&pages, &mut hs);
        assert_eq!(pages_of(&hs), vec![Some(1), Some(3)]);
    }

    #[test]
    fn one_line_resolves_a_single_heading() {
        let pages = ["Usage\nUsage"];
        let mut hs = headings(&["Usage", "Usage", "Usage"]);
        locate_headings(&pages, &mut hs);
        assert_eq!(pages_of(&hs), vec![Some(1), Some(1), None]);
    }

    #[test]
    fn already_resolved_headings_keep_their_page() {
        let mut hs = headings(&["Intro"]);
        hs[0].resolve(NonZeroUsize::new(4).expect("non-zero"));
        locate_headings(&["Intro"], &mut hs);
        assert_eq!(pages_of(&hs), vec![Some(4)]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let pages = ["A\nB", "C\nA", "B\nD"];
        let run = || {
            let mut hs = headings(&["B", "A", "D", "A", "Z"]);
            locate_headings(&pages, &mut hs);
            pages_of(&hs)
        };
        let first = run();
        assert_eq!(first, vec![Some(1), Some(1), Some(3), Some(2), None]);
        for _ in 0..5 {
            assert_eq!(run(), first);
        }
    }

    #[test]
    fn pilcrow_headings_match_plain_lines() {
        let mut hs = vec![Heading::new(HeadingLevel::H2, "Introduction\u{b6}")];
        locate_headings(&["Introduction"], &mut hs);
        assert_eq!(pages_of(&hs), vec![Some(1)]);
    }

    #[test]
    fn extraction_failure_leaves_headings_unresolved() {
        let fragment = Fragment::new(FragmentKind::Body(0), Some(PathBuf::from("x.pdf")))
            .with_headings(headings(&["Intro"]));
        let fragment = resolve_fragment_headings(fragment, &Failing);
        assert_eq!(fragment.resolved_heading_count(), 0);
    }

    #[test]
    fn fragment_headings_resolve_through_extractor() {
        let fragment = Fragment::new(FragmentKind::Body(0), Some(PathBuf::from("x.pdf")))
            .with_headings(headings(&["Intro", "Background"]));
        let extractor = FixedPages(vec!["Intro".to_string(), "Background".to_string()]);
        let fragment = resolve_fragment_headings(fragment, &extractor);
        assert_eq!(pages_of(&fragment.headings), vec![Some(1), Some(2)]);
    }
}
