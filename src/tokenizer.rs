//! Quote-aware splitting of a raw process command line.
//!
//! The rules are deliberately simpler than a shell's: only the space character
//! separates arguments, and a double quote only toggles grouping. Quotes are
//! structural and can never be escaped into a literal `"`.

use crate::assembler::ArgumentVector;
use crate::error::LaunchError;
use log::warn;

/// Characters stripped around every token before quote trimming.
pub const SPACE: &[char] = &[' '];
/// Characters stripped around every token after space trimming.
pub const QUOTE: &[char] = &['"'];

/// Strip every leading and trailing character found in `chars`.
///
/// A string made only of trim characters becomes empty.
pub fn trim<'a>(s: &'a str, chars: &[char]) -> &'a str {
    s.trim_matches(|c| chars.contains(&c))
}

struct CommandLineScanner<'a> {
    input: &'a str,
    start: usize,
    quote: bool,
    tokens: Vec<String>,
}

impl<'a> CommandLineScanner<'a> {
    fn new(input: &'a str) -> Self {
        CommandLineScanner {
            input,
            start: 0,
            quote: false,
            tokens: Vec::new(),
        }
    }

    fn scan(mut self) -> Vec<String> {
        for (i, ch) in self.input.char_indices() {
            match ch {
                '"' => self.quote = !self.quote,
                ' ' if !self.quote => {
                    self.emit(self.start, i);
                    self.start = i;
                }
                _ => {}
            }
        }

        if self.quote {
            warn!("unterminated quote in command line: {}", self.input);
        }

        // The remainder is always a token, quoted or not.
        self.emit(self.start, self.input.len());
        self.tokens
    }

    fn emit(&mut self, from: usize, to: usize) {
        let spaced = trim(&self.input[from..to], SPACE);
        // Nothing but separators between two boundaries.
        if spaced.is_empty() {
            return;
        }
        self.tokens.push(trim(spaced, QUOTE).to_string());
    }
}

/// Split a raw command line into argument tokens.
///
/// # Examples
///
/// ```
/// use jvm_launcher::tokenizer::split_command_line;
/// assert_eq!(
///     split_command_line(r#"foo "bar baz" qux"#),
///     vec!["foo", "bar baz", "qux"]
/// );
/// ```
pub fn split_command_line(line: &str) -> Vec<String> {
    let line = trim(line, SPACE);
    if line.is_empty() {
        return Vec::new();
    }
    CommandLineScanner::new(line).scan()
}

/// Tokenize `line` and append the tokens after whatever `args` already holds.
pub fn append_command_line(line: &str, args: &mut ArgumentVector) -> Result<(), LaunchError> {
    for token in split_command_line(line) {
        args.push(token)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_group_is_one_token() {
        assert_eq!(
            split_command_line(r#"foo "bar baz" qux"#),
            vec!["foo", "bar baz", "qux"]
        );
    }

    #[test]
    fn test_file_argument_with_spaces() {
        assert_eq!(
            split_command_line(r#"--file "my file.txt""#),
            vec!["--file", "my file.txt"]
        );
    }

    #[test]
    fn test_empty_and_blank_lines_produce_nothing() {
        assert!(split_command_line("").is_empty());
        assert!(split_command_line("     ").is_empty());
    }

    #[test]
    fn test_surrounding_and_repeated_spaces_are_ignored() {
        assert_eq!(split_command_line("  a   b  "), vec!["a", "b"]);
    }

    #[test]
    fn test_explicit_empty_quotes_are_kept() {
        assert_eq!(split_command_line(r#"a "" b"#), vec!["a", "", "b"]);
    }

    #[test]
    fn test_unterminated_quote_swallows_remainder() {
        assert_eq!(split_command_line(r#"a "b c  d"#), vec!["a", "b c  d"]);
        assert_eq!(split_command_line(r#"""#), vec![""]);
    }

    #[test]
    fn test_quote_inside_token_toggles_grouping() {
        assert_eq!(
            split_command_line(r#"-Dname="x y" z"#),
            vec![r#"-Dname="x y"#, "z"]
        );
    }

    #[test]
    fn test_tabs_are_not_separators() {
        assert_eq!(split_command_line("a\tb c"), vec!["a\tb", "c"]);
    }

    #[test]
    fn test_trim_handles_degenerate_inputs() {
        assert_eq!(trim("   ", SPACE), "");
        assert_eq!(trim(" a", SPACE), "a");
        assert_eq!(trim("a ", SPACE), "a");
        assert_eq!(trim("", SPACE), "");
        assert_eq!(trim(r#""""#, QUOTE), "");
    }

    #[test]
    fn test_trim_is_idempotent() {
        for s in ["  hello  ", "x", " a b ", "\"q\"", "  \"  spaced \"  "] {
            for set in [SPACE, QUOTE] {
                let once = trim(s, set);
                assert_eq!(trim(once, set), once, "input {s:?}");
            }
        }
    }

    #[test]
    fn test_append_keeps_existing_entries_first() {
        let mut args = ArgumentVector::new("program");
        args.push("--verbose".to_string()).unwrap();
        append_command_line(r#"--file "my file.txt""#, &mut args).unwrap();
        assert_eq!(args.as_slice(), ["--verbose", "--file", "my file.txt"]);
    }
}
