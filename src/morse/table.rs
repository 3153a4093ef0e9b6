// src/morse/table.rs  —  Morse alphabet, tokenizer, prosign handling
//
// Alphabet is A-Z, 0-9 and the punctuation set "/?=.,-" — deliberately a
// smaller set than some Morse references carry, matching the character set
// this crate actually exchanges on the air (callsigns, RST, parks, Qs).

/// Forward lookup: letter/digit/punct → dit/dah string.
pub fn char_to_code(c: char) -> Option<&'static str> {
    match c.to_ascii_uppercase() {
        'A' => Some(".-"),    'B' => Some("-..."),  'C' => Some("-.-."),
        'D' => Some("-.."),   'E' => Some("."),      'F' => Some("..-."),
        'G' => Some("--."),   'H' => Some("...."),   'I' => Some(".."),
        'J' => Some(".---"),  'K' => Some("-.-"),    'L' => Some(".-.."),
        'M' => Some("--"),    'N' => Some("-."),     'O' => Some("---"),
        'P' => Some(".--."),  'Q' => Some("--.-"),   'R' => Some(".-."),
        'S' => Some("..."),   'T' => Some("-"),      'U' => Some("..-"),
        'V' => Some("...-"),  'W' => Some(".--"),    'X' => Some("-..-"),
        'Y' => Some("-.--"),  'Z' => Some("--.."),
        '0' => Some("-----"), '1' => Some(".----"),  '2' => Some("..---"),
        '3' => Some("...--"), '4' => Some("....-"),  '5' => Some("....."),
        '6' => Some("-...."), '7' => Some("--..."),  '8' => Some("---.."),
        '9' => Some("----."),
        '/' => Some("-..-."), '?' => Some("..--.."), '=' => Some("-...-"),
        '.' => Some(".-.-.-"),',' => Some("--..--"), '-' => Some("-....-"),
        _   => None,
    }
}

/// Reverse lookup: dit/dah string → character. O(n) over a small fixed table;
/// called once per decoded symbol so this is not a hot path.
pub fn code_to_char(code: &str) -> Option<char> {
    const TABLE: &[(&str, char)] = &[
        (".-",    'A'), ("-...",  'B'), ("-.-.",  'C'), ("-..",   'D'),
        (".",     'E'), ("..-.",  'F'), ("--.",   'G'), ("....",  'H'),
        ("..",    'I'), (".---",  'J'), ("-.-",   'K'), (".-..",  'L'),
        ("--",    'M'), ("-.",    'N'), ("---",   'O'), (".--.",  'P'),
        ("--.-",  'Q'), (".-.",   'R'), ("...",   'S'), ("-",     'T'),
        ("..-",   'U'), ("...-",  'V'), (".--",   'W'), ("-..-",  'X'),
        ("-.--",  'Y'), ("--..",  'Z'),
        ("-----", '0'), (".----", '1'), ("..---", '2'), ("...--", '3'),
        ("....-", '4'), (".....", '5'), ("-....", '6'), ("--...", '7'),
        ("---..", '8'), ("----.", '9'),
        ("-..-.", '/'), ("..--..", '?'), ("-...-", '='),
        (".-.-.-", '.'), ("--..--", ','), ("-....-", '-'),
    ];
    TABLE.iter().find(|(c, _)| *c == code).map(|(_, ch)| *ch)
}

/// A single tokenized unit of input text: either a plain word of letters
/// (split further by the encoder into individual characters) or a prosign
/// written as `<XYZ>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Prosign(String),
}

/// Tokenize normalized text the way the reference tokenizer regex
/// `<[A-Z0-9]+>|[A-Z0-9/?=.,-]+` does: angle-bracket prosigns are atomic
/// tokens, everything else is split on whitespace into plain-text tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut out = Vec::new();
    for raw in normalize(text).split_whitespace() {
        if raw.starts_with('<') && raw.ends_with('>') && raw.len() > 2 {
            let inner: String = raw[1..raw.len() - 1]
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if !inner.is_empty() {
                out.push(Token::Prosign(inner));
                continue;
            }
        }
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || "/?=.,-".contains(*c))
            .collect();
        if !cleaned.is_empty() {
            out.push(Token::Word(cleaned));
        }
    }
    out
}

/// Uppercase and collapse internal whitespace runs, matching the reference
/// normalizer so pool/config text compares consistently regardless of
/// incoming casing or spacing.
pub fn normalize(text: &str) -> String {
    text.to_ascii_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the dit/dah string for one prosign literal (e.g. "CAVE") by
/// concatenating the codes of its letters with no inter-letter gap marker —
/// callers are responsible for not inserting the normal 3-dot letter gap
/// between the constituent elements.
pub fn prosign_code(literal: &str) -> Option<String> {
    let mut code = String::new();
    for ch in literal.chars() {
        code.push_str(char_to_code(ch)?);
    }
    if code.is_empty() { None } else { Some(code) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_core_alphabet() {
        for c in "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".chars() {
            let code = char_to_code(c).unwrap();
            assert_eq!(code_to_char(code), Some(c));
        }
    }

    #[test]
    fn tokenizes_prosigns_and_words() {
        let toks = tokenize("cq cq de dd6ds <AR>");
        assert_eq!(
            toks,
            vec![
                Token::Word("CQ".into()),
                Token::Word("CQ".into()),
                Token::Word("DE".into()),
                Token::Word("DD6DS".into()),
                Token::Prosign("AR".into()),
            ]
        );
    }

    #[test]
    fn prosign_code_concatenates_without_gaps() {
        // CAVE = -.-.  .-  ...-  .
        assert_eq!(prosign_code("CAVE").unwrap(), "-.-..-...-.");
    }
}
