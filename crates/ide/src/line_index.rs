use ropey::Rope;

use syntax::TextSize;

/// A zero-based line and column, the coordinates editor protocols speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

#[derive(Debug, Eq, PartialEq)]
pub struct LineIndex {
    rope: Rope,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
        }
    }

    pub fn line_col(&self, pos: TextSize) -> Option<LineCol> {
        let char_idx = usize::from(pos);
        let line = self.rope.try_char_to_line(char_idx).ok()?;
        let line_start = self.rope.line_to_char(line);
        Some(LineCol {
            line: line.try_into().ok()?,
            col: (char_idx - line_start).try_into().ok()?,
        })
    }

    pub fn offset(&self, line_col: LineCol) -> Option<TextSize> {
        let line_start = self.rope.try_line_to_char(line_col.line as usize).ok()?;
        let char_idx = line_start + line_col.col as usize;
        if char_idx > self.rope.len_chars() {
            return None;
        }
        char_idx.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use syntax::TextSize;

    use super::{LineCol, LineIndex};

    #[test]
    fn line_col_round_trip() {
        let index = LineIndex::new(".X = 1\n.Y = 2\n");
        let pos = TextSize::new(8);
        let line_col = LineCol { line: 1, col: 1 };
        assert_eq!(index.line_col(pos), Some(line_col));
        assert_eq!(index.offset(line_col), Some(pos));
    }

    #[test]
    fn out_of_bounds_positions_are_rejected() {
        let index = LineIndex::new(".X = 1");
        assert_eq!(index.offset(LineCol { line: 5, col: 0 }), None);
        assert_eq!(index.offset(LineCol { line: 0, col: 100 }), None);
    }
}
