// src/loaders/callsigns.rs  —  callsign pool file parser
//
// UTF-8 text, "#"-prefixed comment lines, optional BOM, first comma-separated
// field per line, uppercased, de-duplicated keeping first occurrence.

/// Parse already-split lines into a de-duplicated, uppercased callsign list.
pub fn parse_lines<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> Vec<String> {
    let mut calls = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw in lines {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let first = line.split(',').next().unwrap_or("").trim().to_ascii_uppercase();
        if first.is_empty() || first.starts_with('#') {
            continue;
        }
        if seen.insert(first.clone()) {
            calls.push(first);
        }
    }
    calls
}

pub fn parse_text(text: &str) -> Vec<String> {
    parse_lines(text.lines())
}

pub fn load_file(path: &str) -> anyhow::Result<Vec<String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(parse_text(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "# pool\nEA3IPX\n\n#more\nN1MM, extra field\n";
        assert_eq!(parse_text(text), vec!["EA3IPX".to_string(), "N1MM".to_string()]);
    }

    #[test]
    fn dedupes_keeping_first_occurrence() {
        let text = "ea3ipx\nEA3IPX\nN1MM\n";
        assert_eq!(parse_text(text), vec!["EA3IPX".to_string(), "N1MM".to_string()]);
    }

    #[test]
    fn strips_leading_bom() {
        let text = "\u{feff}EA3IPX\n";
        assert_eq!(parse_text(text), vec!["EA3IPX".to_string()]);
    }
}
