use std::fmt;

/// A 1-based line/column location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// Maps byte offsets produced by the lexer back to line/column positions.
///
/// Columns count characters, not bytes, so multi-byte UTF-8 text in strings
/// and comments does not skew the positions reported after it.
#[derive(Debug, Clone)]
pub struct SourceMap<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
}

impl<'src> SourceMap<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        for (offset, c) in source.char_indices() {
            if c == '\n' {
                line_starts.push(offset + 1);
            }
        }
        SourceMap { source, line_starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line_index];
        let column = self.source[line_start..offset].chars().count() + 1;
        Position::new(line_index + 1, column)
    }

    /// Position one past the final character, used for the end-of-input token.
    pub fn end(&self) -> Position {
        self.position(self.source.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_character_is_line_one_column_one() {
        let map = SourceMap::new("abc");
        assert_eq!(map.position(0), Position::new(1, 1));
        assert_eq!(map.position(2), Position::new(1, 3));
    }

    #[test]
    fn positions_after_newlines() {
        let map = SourceMap::new("1 \n2\n3");
        assert_eq!(map.position(3), Position::new(2, 1));
        assert_eq!(map.position(5), Position::new(3, 1));
        assert_eq!(map.end(), Position::new(3, 2));
    }

    #[test]
    fn columns_count_characters() {
        let map = SourceMap::new("\"Łódź\" x");
        assert_eq!(map.position("\"Łódź\" ".len()), Position::new(1, 8));
    }
}
