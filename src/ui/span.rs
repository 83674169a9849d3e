//! Styled chat text.
//!
//! [`StyledText`] pairs a plain string with a sorted list of non-overlapping
//! [`StyleRun`]s. Rules and formatters layer styles on top of each other; a
//! later style always wins on the bytes it covers, and text edits re-map the
//! runs that sit around them.
//!
//! # Examples
//!
//! ```
//! use chatdeck::ui::span::StyledText;
//! use ratatui::style::{Color, Style};
//!
//! let mut text = StyledText::new("<Steve> hello");
//! text.style_range(0..7, Style::default().fg(Color::Yellow));
//!
//! let segments: Vec<_> = text.segments().collect();
//! assert_eq!(segments[0].0, "<Steve>");
//! assert!(segments[0].1.is_some());
//! assert_eq!(segments[1], (" hello", None));
//! ```

use ratatui::style::Style;
use ratatui::text::{Line, Span};
use std::ops::Range;

/// A style applied over a byte range of the owning text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyleRun {
    pub range: Range<usize>,
    pub style: Style,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyledText {
    text: String,
    runs: Vec<StyleRun>,
}

impl StyledText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            runs: Vec::new(),
        }
    }

    /// Text with a single style over its whole length.
    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        let mut styled = Self::new(text);
        let len = styled.text.len();
        styled.style_range(0..len, style);
        styled
    }

    #[inline]
    pub fn plain(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn runs(&self) -> &[StyleRun] {
        &self.runs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Style recorded for the byte at `index`, if any.
    pub fn style_at(&self, index: usize) -> Option<Style> {
        self.runs
            .iter()
            .find(|run| run.range.contains(&index))
            .map(|run| run.style)
    }

    /// Apply `style` over `range`, replacing whatever styles covered those bytes.
    pub fn style_range(&mut self, range: Range<usize>, style: Style) {
        let range = self.clamp(range);
        if range.is_empty() {
            return;
        }

        let mut next = Vec::with_capacity(self.runs.len() + 2);
        for run in self.runs.drain(..) {
            if run.range.end <= range.start || run.range.start >= range.end {
                next.push(run);
                continue;
            }
            if run.range.start < range.start {
                next.push(StyleRun {
                    range: run.range.start..range.start,
                    style: run.style,
                });
            }
            if run.range.end > range.end {
                next.push(StyleRun {
                    range: range.end..run.range.end,
                    style: run.style,
                });
            }
        }
        next.push(StyleRun { range, style });
        next.sort_by_key(|run| run.range.start);
        self.runs = next;
    }

    /// Apply `style` only to the parts of `range` that carry no style yet.
    pub fn fill_unstyled(&mut self, range: Range<usize>, style: Style) {
        let range = self.clamp(range);
        if range.is_empty() {
            return;
        }

        let mut gaps = Vec::new();
        let mut cursor = range.start;
        for run in &self.runs {
            if run.range.end <= cursor {
                continue;
            }
            if run.range.start >= range.end {
                break;
            }
            if run.range.start > cursor {
                gaps.push(cursor..run.range.start);
            }
            cursor = cursor.max(run.range.end);
        }
        if cursor < range.end {
            gaps.push(cursor..range.end);
        }

        for gap in gaps {
            self.runs.push(StyleRun { range: gap, style });
        }
        self.runs.sort_by_key(|run| run.range.start);
    }

    /// Replace the bytes in `range` with `replacement`.
    ///
    /// Runs before the edit are untouched, runs after it are shifted, and the
    /// inserted text starts out unstyled.
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) {
        let range = self.clamp(range);
        let added = replacement.len();
        let shift = |pos: usize| pos - range.end + range.start + added;

        self.text.replace_range(range.clone(), replacement);

        let mut next = Vec::with_capacity(self.runs.len() + 1);
        for run in self.runs.drain(..) {
            if run.range.end <= range.start {
                next.push(run);
                continue;
            }
            if run.range.start >= range.end {
                next.push(StyleRun {
                    range: shift(run.range.start)..shift(run.range.end),
                    style: run.style,
                });
                continue;
            }
            if run.range.start < range.start {
                next.push(StyleRun {
                    range: run.range.start..range.start,
                    style: run.style,
                });
            }
            if run.range.end > range.end {
                next.push(StyleRun {
                    range: range.start + added..shift(run.range.end),
                    style: run.style,
                });
            }
        }
        self.runs = next;
    }

    /// Append `other`, carrying its styles along.
    pub fn append(&mut self, other: StyledText) {
        let offset = self.text.len();
        self.text.push_str(&other.text);
        self.runs.extend(other.runs.into_iter().map(|run| StyleRun {
            range: run.range.start + offset..run.range.end + offset,
            style: run.style,
        }));
    }

    pub fn push_str(&mut self, text: &str, style: Option<Style>) {
        match style {
            Some(style) => self.append(StyledText::styled(text, style)),
            None => self.text.push_str(text),
        }
    }

    /// Walk the text as consecutive `(slice, style)` pieces covering every byte.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            text: self,
            cursor: 0,
            run: 0,
        }
    }

    /// Convert to a ratatui line, patching every run onto `base`.
    pub fn to_line(&self, base: Style) -> Line<'static> {
        let spans: Vec<Span<'static>> = self
            .segments()
            .map(|(slice, style)| {
                let style = style.map_or(base, |style| base.patch(style));
                Span::styled(slice.to_string(), style)
            })
            .collect();
        Line::from(spans)
    }

    fn clamp(&self, range: Range<usize>) -> Range<usize> {
        let floor = |mut pos: usize| {
            pos = pos.min(self.text.len());
            while !self.text.is_char_boundary(pos) {
                pos -= 1;
            }
            pos
        };
        let start = floor(range.start);
        let end = floor(range.end).max(start);
        start..end
    }
}

impl From<&str> for StyledText {
    fn from(text: &str) -> Self {
        StyledText::new(text)
    }
}

impl From<String> for StyledText {
    fn from(text: String) -> Self {
        StyledText::new(text)
    }
}

pub struct Segments<'a> {
    text: &'a StyledText,
    cursor: usize,
    run: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = (&'a str, Option<Style>);

    fn next(&mut self) -> Option<Self::Item> {
        let text = &self.text.text;
        if self.cursor >= text.len() {
            return None;
        }

        match self.text.runs.get(self.run) {
            Some(run) if run.range.start <= self.cursor => {
                let slice = &text[self.cursor..run.range.end];
                self.cursor = run.range.end;
                self.run += 1;
                Some((slice, Some(run.style)))
            }
            Some(run) => {
                let slice = &text[self.cursor..run.range.start];
                self.cursor = run.range.start;
                Some((slice, None))
            }
            None => {
                let slice = &text[self.cursor..];
                self.cursor = text.len();
                Some((slice, None))
            }
        }
    }
}
