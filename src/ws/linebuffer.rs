use thiserror::Error;

use crate::models::DocumentContent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineBufferError {
    #[error("Line index {index} is out of range (document has {len} lines)")]
    OutOfRange { index: usize, len: usize },
    #[error("Line 0 has no previous line to merge with")]
    MergeAtFirstLine,
}

/// In-memory text of one document, held as an ordered list of lines.
///
/// All richer edits (typing, paste, multi-line delete) are expressed by
/// clients as a sequence of the four primitives below.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    title: String,
    lines: Vec<String>,
}

impl LineBuffer {
    /// Build a buffer from stored content. Content uses `\n` as separator,
    /// so an empty document still yields one empty line.
    pub fn from_document(title: &str, content: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: content.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn check_index(&self, index: usize) -> Result<(), LineBufferError> {
        if index < self.lines.len() {
            Ok(())
        } else {
            Err(LineBufferError::OutOfRange { index, len: self.lines.len() })
        }
    }

    /// Split line `index` in two at character column `at_column`.
    /// The column is clamped to the line length.
    pub fn split_line(&mut self, index: usize, at_column: usize) -> Result<(), LineBufferError> {
        self.check_index(index)?;
        let line = &self.lines[index];
        let byte_offset = line
            .char_indices()
            .nth(at_column)
            .map(|(offset, _)| offset)
            .unwrap_or(line.len());
        let tail = line[byte_offset..].to_string();
        self.lines[index].truncate(byte_offset);
        self.lines.insert(index + 1, tail);
        Ok(())
    }

    /// Merge line `index` into the line before it. Returns the column where
    /// the cursor lands, i.e. the character length of the previous line.
    pub fn merge_with_previous(&mut self, index: usize) -> Result<usize, LineBufferError> {
        self.check_index(index)?;
        if index == 0 {
            return Err(LineBufferError::MergeAtFirstLine);
        }
        let current = self.lines.remove(index);
        let previous = &mut self.lines[index - 1];
        let column = previous.chars().count();
        previous.push_str(&current);
        Ok(column)
    }

    /// Last-writer-wins overwrite of one line.
    pub fn replace_line(&mut self, index: usize, content: &str) -> Result<(), LineBufferError> {
        self.check_index(index)?;
        self.lines[index] = content.to_string();
        Ok(())
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn serialize(&self) -> DocumentContent {
        DocumentContent {
            title: self.title.clone(),
            content: self.lines.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(content: &str) -> LineBuffer {
        LineBuffer::from_document("T", content)
    }

    #[test]
    fn loads_and_serializes_unchanged() {
        let buf = buffer("a\nb\nc");
        assert_eq!(buf.lines(), ["a", "b", "c"]);
        let out = buf.serialize();
        assert_eq!(out.title, "T");
        assert_eq!(out.content, "a\nb\nc");
    }

    #[test]
    fn empty_content_is_one_empty_line() {
        let buf = buffer("");
        assert_eq!(buf.lines(), [""]);
        assert_eq!(buf.serialize().content, "");
    }

    #[test]
    fn split_line_at_cursor() {
        let mut buf = buffer("HELLO\nworld");
        buf.split_line(0, 3).unwrap();
        assert_eq!(buf.lines(), ["HEL", "LO", "world"]);
    }

    #[test]
    fn split_line_clamps_column() {
        let mut buf = buffer("abc");
        buf.split_line(0, 99).unwrap();
        assert_eq!(buf.lines(), ["abc", ""]);

        let mut buf = buffer("abc");
        buf.split_line(0, 0).unwrap();
        assert_eq!(buf.lines(), ["", "abc"]);
    }

    #[test]
    fn split_line_counts_characters_not_bytes() {
        let mut buf = buffer("héllo");
        buf.split_line(0, 2).unwrap();
        assert_eq!(buf.lines(), ["hé", "llo"]);
    }

    #[test]
    fn merge_returns_cursor_column() {
        let mut buf = buffer("HEL\nLO\nworld");
        let column = buf.merge_with_previous(1).unwrap();
        assert_eq!(column, 3);
        assert_eq!(buf.lines(), ["HELLO", "world"]);
    }

    #[test]
    fn merge_at_first_line_is_rejected() {
        let mut buf = buffer("a\nb");
        assert_eq!(buf.merge_with_previous(0), Err(LineBufferError::MergeAtFirstLine));
        assert_eq!(buf.lines(), ["a", "b"]);
    }

    #[test]
    fn out_of_range_edits_leave_buffer_untouched() {
        let mut buf = buffer("HELLO\nworld");
        assert_eq!(
            buf.replace_line(99, "x"),
            Err(LineBufferError::OutOfRange { index: 99, len: 2 })
        );
        assert!(buf.split_line(2, 0).is_err());
        assert!(buf.merge_with_previous(2).is_err());
        assert_eq!(buf.lines(), ["HELLO", "world"]);
    }

    #[test]
    fn line_count_tracks_adds_and_removes() {
        let mut buf = buffer("one\ntwo\nthree");
        buf.split_line(0, 1).unwrap();
        buf.split_line(3, 2).unwrap();
        buf.split_line(1, 0).unwrap();
        buf.merge_with_previous(2).unwrap();
        assert_eq!(buf.len(), 3 + 3 - 1);
    }

    #[test]
    fn title_and_line_replacement() {
        let mut buf = buffer("a\nb");
        buf.set_title("New");
        buf.replace_line(1, "B").unwrap();
        let out = buf.serialize();
        assert_eq!(out.title, "New");
        assert_eq!(out.content, "a\nB");
    }
}
