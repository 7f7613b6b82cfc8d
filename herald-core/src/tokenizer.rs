//! Argument tokenizer.
//!
//! Splits command text on whitespace while honoring double-quoted spans,
//! following the Windows command-line convention the bot has always used:
//!
//! - whitespace outside quotes separates tokens;
//! - `"` toggles a quoted span and is not part of the token, so `ab"c d"e`
//!   is the single token `abc de` and `""` is one empty token;
//! - inside a quoted span, `""` is a literal `"` and the span stays open,
//!   so `"a""b"` is `a"b`;
//! - a run of backslashes is literal unless it precedes a `"`, in which case
//!   each pair becomes one backslash and an odd trailing backslash turns the
//!   quote into a literal `"`;
//! - an unterminated quote runs to the end of the input (no error).

/// A command line split into its name, arguments, and raw trailing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The first token, as typed (not case-folded).
    pub name: String,
    /// Every token after the name.
    pub args: Vec<String>,
    /// The original text after the name token, leading whitespace removed.
    /// Quotes and inner spacing are preserved verbatim.
    pub raw_args: String,
}

/// Split `raw` into an ordered sequence of arguments.
pub fn tokenize(raw: &str) -> Vec<String> {
    scan(raw).into_iter().map(|(token, _)| token).collect()
}

/// Split command text into name, arguments and raw argument string.
///
/// Returns `None` when the text holds no tokens at all.
pub fn split_command(raw: &str) -> Option<CommandLine> {
    let mut tokens = scan(raw).into_iter();
    let (name, name_end) = tokens.next()?;
    Some(CommandLine {
        name,
        args: tokens.map(|(token, _)| token).collect(),
        raw_args: raw[name_end..].trim_start().to_string(),
    })
}

/// Tokenize, returning each token with the byte offset just past its end.
fn scan(raw: &str) -> Vec<(String, usize)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // A quoted span can produce an empty token, so presence is tracked apart
    // from `current.is_empty()`.
    let mut in_token = false;
    let mut in_quotes = false;
    let mut backslashes = 0usize;

    let mut chars = raw.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                backslashes += 1;
                in_token = true;
            }
            '"' => {
                push_backslashes(&mut current, backslashes / 2);
                if backslashes % 2 == 1 {
                    current.push('"');
                } else if in_quotes && matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = !in_quotes;
                }
                backslashes = 0;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                push_backslashes(&mut current, backslashes);
                backslashes = 0;
                if in_token {
                    tokens.push((std::mem::take(&mut current), idx));
                    in_token = false;
                }
            }
            c => {
                push_backslashes(&mut current, backslashes);
                backslashes = 0;
                current.push(c);
                in_token = true;
            }
        }
    }

    push_backslashes(&mut current, backslashes);
    if in_token {
        tokens.push((current, raw.len()));
    }
    tokens
}

fn push_backslashes(buf: &mut String, count: usize) {
    buf.extend(std::iter::repeat_n('\\', count));
}
