// src/loaders/parks.rs  —  park-reference pool CSV parser
//
// UTF-8 CSV with a header row. Rows with `active == "1"` contribute their
// `reference` field, uppercased, de-duplicated keeping first occurrence.
// Fields are not expected to carry embedded commas or quoting (the reference
// implementation's own export format doesn't either), so a plain
// header-indexed comma split is used rather than pulling in a full CSV crate.

pub fn parse_text(text: &str) -> Vec<String> {
    let mut lines = text.lines();
    let Some(header_line) = lines.next() else { return Vec::new() };
    let header: Vec<String> = header_line.split(',').map(|h| h.trim().to_string()).collect();
    let Some(ref_idx) = header.iter().position(|h| h.eq_ignore_ascii_case("reference")) else {
        return Vec::new();
    };
    let active_idx = header.iter().position(|h| h.eq_ignore_ascii_case("active"));

    let mut refs = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let reference = fields.get(ref_idx).map(|s| s.trim().to_ascii_uppercase()).unwrap_or_default();
        if reference.is_empty() {
            continue;
        }
        // No `active` column at all means every row's flag is implicitly
        // empty, not implicitly "1" — match the original loader's
        // `row.get("active", "")` default, which skips every row rather
        // than admitting them all.
        let active = match active_idx {
            Some(idx) => fields.get(idx).map(|s| s.trim()).unwrap_or(""),
            None => "",
        };
        if active != "1" {
            continue;
        }
        if seen.insert(reference.clone()) {
            refs.push(reference);
        }
    }
    refs
}

pub fn load_file(path: &str) -> anyhow::Result<Vec<String>> {
    let data = std::fs::read_to_string(path)?;
    Ok(parse_text(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_active_flag() {
        let csv = "reference,name,active\nUS-0001,Park One,1\nUS-0002,Park Two,0\n";
        assert_eq!(parse_text(csv), vec!["US-0001".to_string()]);
    }

    #[test]
    fn dedupes_and_uppercases() {
        let csv = "active,reference\n1,us-0001\n1,US-0001\n";
        assert_eq!(parse_text(csv), vec!["US-0001".to_string()]);
    }

    #[test]
    fn missing_reference_column_yields_empty() {
        let csv = "name,active\nFoo,1\n";
        assert!(parse_text(csv).is_empty());
    }

    #[test]
    fn missing_active_column_yields_empty() {
        let csv = "reference,name\nUS-0001,Park One\nUS-0002,Park Two\n";
        assert!(parse_text(csv).is_empty());
    }
}
