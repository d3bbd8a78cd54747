use crate::TextRun;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub page: u32,
    pub run: TextRun,
    pub char_offset: usize,
    pub char_len: usize,
}

impl SearchMatch {
    /// Glyph-space rectangle `[x0, y0, x1, y1]` of the matched substring.
    ///
    /// Per-glyph advances are not kept, so the extent along the run is
    /// estimated by giving every character the same width. Rotated runs get
    /// the bounding box of the rotated substring.
    pub fn glyph_rect(&self) -> [f32; 4] {
        let total = self.run.text.to_lowercase().chars().count().max(1) as f32;
        let start = self.run.width * (self.char_offset as f32 / total);
        let end = start + self.run.width * (self.char_len as f32 / total);
        let corners = [
            self.run.point_at(start, 0.0),
            self.run.point_at(end, 0.0),
            self.run.point_at(start, self.run.height),
            self.run.point_at(end, self.run.height),
        ];
        corners.iter().fold(
            [f32::MAX, f32::MAX, f32::MIN, f32::MIN],
            |[x0, y0, x1, y1], &(x, y)| [x0.min(x), y0.min(y), x1.max(x), y1.max(y)],
        )
    }
}

/// `(offset, len)` in characters of the first case-insensitive occurrence of
/// `needle` in `run`. `needle` must already be lowercase.
pub fn find_in_run(run: &TextRun, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let haystack = run.text.to_lowercase();
    let byte_offset = haystack.find(needle)?;
    Some((
        haystack[..byte_offset].chars().count(),
        needle.chars().count(),
    ))
}

pub fn matches_on_page(page: u32, runs: &[TextRun], query: &str) -> Vec<SearchMatch> {
    let needle = query.to_lowercase();
    runs.iter()
        .filter_map(|run| {
            find_in_run(run, &needle).map(|(char_offset, char_len)| SearchMatch {
                page,
                run: run.clone(),
                char_offset,
                char_len,
            })
        })
        .collect()
}

pub fn is_searchable(query: &str, min_len: usize) -> bool {
    query.chars().count() >= min_len
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSummary {
    pub count: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MatchList {
    query: String,
    matches: Vec<SearchMatch>,
    cursor: Option<usize>,
}

impl MatchList {
    pub fn new(query: impl Into<String>, matches: Vec<SearchMatch>) -> Self {
        let cursor = if matches.is_empty() { None } else { Some(0) };
        Self {
            query: query.into(),
            matches,
            cursor,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&SearchMatch> {
        self.cursor.and_then(|idx| self.matches.get(idx))
    }

    pub fn advance(&mut self) -> Option<&SearchMatch> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        self.cursor = Some(self.cursor.map_or(0, |idx| (idx + 1) % len));
        self.current()
    }

    pub fn retreat(&mut self) -> Option<&SearchMatch> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        self.cursor = Some(self.cursor.map_or(len - 1, |idx| (idx + len - 1) % len));
        self.current()
    }

    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            count: self.matches.len(),
            index: self.cursor.map_or(0, |idx| idx + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> TextRun {
        TextRun::new(text, 72.0, 700.0, 200.0, 12.0)
    }

    fn list_of(n: usize) -> MatchList {
        let matches = (0..n)
            .map(|i| SearchMatch {
                page: i as u32 + 1,
                run: run("torque"),
                char_offset: 0,
                char_len: 6,
            })
            .collect();
        MatchList::new("torque", matches)
    }

    #[test]
    fn find_is_case_insensitive_and_reports_char_offsets() {
        let found = find_in_run(&run("Torque Specification"), "spec");
        assert_eq!(found, Some((7, 4)));
        assert_eq!(find_in_run(&run("Torque"), "xyz"), None);
    }

    #[test]
    fn matches_keep_run_order() {
        let runs = vec![run("Check torque"), run("Voltage"), run("TORQUE table")];
        let found = matches_on_page(4, &runs, "Torque");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| m.page == 4));
        assert_eq!(found[0].run.text, "Check torque");
        assert_eq!(found[1].run.text, "TORQUE table");
    }

    #[test]
    fn next_cycles_back_to_first_match() {
        let mut list = list_of(3);
        assert_eq!(list.summary(), SearchSummary { count: 3, index: 1 });
        for _ in 0..3 {
            list.advance();
        }
        assert_eq!(list.summary().index, 1);
    }

    #[test]
    fn previous_from_first_lands_on_last() {
        let mut list = list_of(4);
        let last = list.retreat().map(|m| m.page);
        assert_eq!(last, Some(4));
        assert_eq!(list.summary().index, 4);
    }

    #[test]
    fn empty_list_never_moves() {
        let mut list = MatchList::new("xyz123", Vec::new());
        assert!(list.advance().is_none());
        assert!(list.retreat().is_none());
        assert_eq!(list.summary(), SearchSummary { count: 0, index: 0 });
    }

    #[test]
    fn glyph_rect_estimates_substring_extent() {
        let found = SearchMatch {
            page: 1,
            run: TextRun::new("abcdefghij", 100.0, 500.0, 100.0, 10.0),
            char_offset: 2,
            char_len: 5,
        };
        assert_eq!(found.glyph_rect(), [120.0, 500.0, 170.0, 510.0]);
    }

    #[test]
    fn glyph_rect_follows_rotated_and_scaled_runs() {
        // Text running up the page, with a font matrix scaled by 12.
        let run = TextRun::new("abcdefghij", 100.0, 500.0, 100.0, 10.0)
            .with_transform([0.0, 12.0, -12.0, 0.0, 100.0, 500.0]);
        let found = SearchMatch {
            page: 1,
            run,
            char_offset: 2,
            char_len: 5,
        };
        assert_eq!(found.glyph_rect(), [90.0, 520.0, 100.0, 570.0]);
    }

    #[test]
    fn short_queries_are_not_searchable() {
        assert!(!is_searchable("to", 3));
        assert!(is_searchable("tor", 3));
        assert!(!is_searchable("", 3));
    }
}
