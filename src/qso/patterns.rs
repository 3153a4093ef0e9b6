// src/qso/patterns.rs  —  C6: exchange pattern engine (acceptance regex + TX templates)
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExchangePatterns {
    pub s0: HashMap<String, Vec<String>>,
    pub s2: HashMap<String, Vec<String>>,
    pub s5: HashMap<String, Vec<String>>,
    pub tx: HashMap<String, String>,
}

impl Default for ExchangePatterns {
    fn default() -> Self {
        default_exchange_patterns()
    }
}

pub fn default_exchange_patterns() -> ExchangePatterns {
    let mut s0 = HashMap::new();
    s0.insert("SIMPLE".into(), vec![r"^.*(?:CQ)+.*DE.*(?:\{MY_CALL\})+.*K.*$".into()]);
    s0.insert("POTA".into(), vec![r"^.*(?:CQ)+.*POTA.*DE.*(?:\{MY_CALL\})+.*K.*$".into()]);
    s0.insert("SOTA".into(), vec![r"^.*(?:CQ)+.*SOTA.*DE.*(?:\{MY_CALL\})+.*K.*$".into()]);

    let mut s2 = HashMap::new();
    s2.insert(
        "report_require_call".into(),
        vec![r"^.*\{OTHER_CALL\}.*(?:[1-5][1-9N][9N]).*(?:[1-5][1-9N][9N]).*$".into()],
    );
    s2.insert(
        "report_require_call_allow_599".into(),
        vec![r"^.*\{OTHER_CALL\}.*(?:[1-5][1-9N][9N]).*(?:[1-5][1-9N][9N]).*$".into()],
    );
    s2.insert("report_no_call".into(), vec![r"^.*(?:[1-5][1-9N][9N]).*(?:[1-5][1-9N][9N]).*$".into()]);
    s2.insert(
        "report_no_call_allow_599".into(),
        vec![r"^.*(?:[1-5][1-9N][9N]).*(?:[1-5][1-9N][9N]).*$".into()],
    );
    s2.insert("p2p_ack".into(), vec![r"^\{OTHER_CALL\}$".into()]);

    let mut s5 = HashMap::new();
    s5.insert("with_prosign".into(), vec![r"^.*\{PROSIGN\}.*73.*EE.*$".into()]);
    s5.insert("with_prosign_allow_tu".into(), vec![r"^.*\{PROSIGN\}.*TU.*73.*EE.*$".into()]);
    s5.insert("without_prosign".into(), vec![r"^.*73.*EE.*$".into()]);
    s5.insert("without_prosign_allow_tu".into(), vec![r"^.*TU.*73.*EE.*$".into()]);
    s5.insert(
        "p2p_with_prosign".into(),
        vec![r"^.*\{PROSIGN\}.*\{OTHER_CALL_REAL\}.*\{MY_CALL\}.*MY.*REF.*\{MY_PARK_REF\}.*\{MY_PARK_REF\}.*$".into()],
    );
    s5.insert(
        "p2p_with_prosign_allow_tu".into(),
        vec![r"^.*\{PROSIGN\}.*\{OTHER_CALL_REAL\}.*\{MY_CALL\}.*MY.*REF.*\{MY_PARK_REF\}.*\{MY_PARK_REF\}.*TU.*73.*\{PROSIGN\}.*$".into()],
    );
    s5.insert(
        "p2p_without_prosign".into(),
        vec![r"^.*\{OTHER_CALL_REAL\}.*\{MY_CALL\}.*MY.*REF.*\{MY_PARK_REF\}.*\{MY_PARK_REF\}.*$".into()],
    );
    s5.insert(
        "p2p_without_prosign_allow_tu".into(),
        vec![r"^.*\{OTHER_CALL_REAL\}.*\{MY_CALL\}.*MY.*REF.*\{MY_PARK_REF\}.*\{MY_PARK_REF\}.*TU.*73.*$".into()],
    );

    let mut tx = HashMap::new();
    tx.insert("caller_call".into(), "{CALL} {CALL}".into());
    tx.insert("repeat_selected_call".into(), "{OTHER_CALL} {OTHER_CALL}".into());
    tx.insert("ack_rr".into(), "RR".into());
    tx.insert("report_reply".into(), "{TX_PROSIGN} UR 5NN 5NN TU 73 {TX_PROSIGN}".into());
    tx.insert("qso_complete".into(), "EE".into());
    tx.insert("p2p_repeat_call".into(), "{OTHER_CALL_REAL} {OTHER_CALL_REAL}".into());
    tx.insert("p2p_repeat_ref".into(), "{PARK_REF} {PARK_REF}".into());
    tx.insert(
        "p2p_station_reply_without_tu".into(),
        "{TX_PROSIGN} {OTHER_CALL_REAL} {OTHER_CALL_REAL} MY REF {PARK_REF} {PARK_REF} 73 {TX_PROSIGN}".into(),
    );
    tx.insert(
        "p2p_station_reply_with_tu".into(),
        "{TX_PROSIGN} {OTHER_CALL_REAL} {OTHER_CALL_REAL} MY REF {PARK_REF} {PARK_REF} TU 73 {TX_PROSIGN}".into(),
    );

    ExchangePatterns { s0, s2, s5, tx }
}

/// Load an exchange-pattern document (JSON, matching the external
/// `patterns: { s0, s2, s5, tx }` shape), merging on top of the built-in
/// defaults. Unreadable/malformed documents fall back to defaults with a
/// warning, as do individual malformed entries.
pub fn load_exchange_patterns(path: Option<&str>) -> (ExchangePatterns, Option<String>) {
    let defaults = default_exchange_patterns();
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return (defaults, None);
    };
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return (defaults, Some(format!("Pattern file not found: {path}. Using built-in defaults."))),
    };
    let raw: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => return (defaults, Some(format!("Pattern file could not be read: {path} ({e}). Using built-in defaults."))),
    };
    let node = raw.get("patterns").unwrap_or(&raw);
    let mut merged = defaults;
    merge_section(&mut merged.s0, node.get("s0"), true);
    merge_section(&mut merged.s2, node.get("s2"), false);
    merge_section(&mut merged.s5, node.get("s5"), false);
    merge_templates(&mut merged.tx, node.get("tx"));
    (merged, None)
}

fn merge_section(target: &mut HashMap<String, Vec<String>>, updates: Option<&serde_json::Value>, uppercase_keys: bool) {
    let Some(obj) = updates.and_then(|v| v.as_object()) else { return };
    for (key, value) in obj {
        let key = if uppercase_keys { key.trim().to_uppercase() } else { key.trim().to_string() };
        if key.is_empty() {
            continue;
        }
        let patterns = as_pattern_list(value);
        if !patterns.is_empty() {
            target.insert(key, patterns);
        }
    }
}

fn as_pattern_list(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn merge_templates(target: &mut HashMap<String, String>, updates: Option<&serde_json::Value>) {
    let Some(obj) = updates.and_then(|v| v.as_object()) else { return };
    for (key, value) in obj {
        if let Some(s) = value.as_str() {
            let key = key.trim().to_string();
            let val = s.trim().to_string();
            if !key.is_empty() && !val.is_empty() {
                target.insert(key, val);
            }
        }
    }
}

/// Placeholder values substituted into both acceptance and TX templates.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    pub my_call: String,
    pub other_call: String,
    pub other_call_real: String,
    pub call: String,
    pub prosign: String,
    pub tx_prosign: String,
    pub park_ref: String,
    pub my_park_ref: String,
}

impl Placeholders {
    fn get(&self, name: &str) -> &str {
        match name {
            "MY_CALL" => &self.my_call,
            "OTHER_CALL" => &self.other_call,
            "OTHER_CALL_REAL" => &self.other_call_real,
            "CALL" => &self.call,
            "PROSIGN" => &self.prosign,
            "TX_PROSIGN" => &self.tx_prosign,
            "PARK_REF" => &self.park_ref,
            "MY_PARK_REF" => &self.my_park_ref,
            _ => "",
        }
    }
}

/// Render an acceptance template: substitute `{NAME}` placeholders with
/// their *regex-escaped* current value (the rest of the template remains
/// live regex), then test the compact RX projection against it in full.
pub fn accepts(template: &str, placeholders: &Placeholders, compact_rx: &str) -> bool {
    let rendered = substitute(template, placeholders, true);
    match Regex::new(&rendered) {
        Ok(re) => re.is_match(compact_rx),
        Err(_) => false,
    }
}

/// Render a TX template: substitute placeholders literally, then collapse
/// runs of whitespace.
pub fn render_tx(template: &str, placeholders: &Placeholders) -> String {
    let rendered = substitute(template, placeholders, false);
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn substitute(template: &str, placeholders: &Placeholders, escape_for_regex: bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i..].find('}') {
                let name = &template[i + 1..i + end];
                if name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                    let value = placeholders.get(name);
                    if escape_for_regex {
                        out.push_str(&regex::escape(value));
                    } else {
                        out.push_str(value);
                    }
                    i += end + 1;
                    continue;
                }
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    let _ = chars.peek();
    out
}

/// Uppercase, strip angle brackets around a prosign token, remove all
/// whitespace and hyphens. Used to build the compact RX projection for
/// matching. Hyphens only ever appear in this system inside park
/// references ("US-0001" vs "US0001"), so stripping them here — rather than
/// special-casing tokens that look like a park reference — lets a
/// character-by-character send and a run-together send of the same
/// reference match the same acceptance rule without extra bookkeeping.
pub fn compact_token(token: &str) -> String {
    let t = token.trim().to_uppercase();
    let t = if t.starts_with('<') && t.ends_with('>') && t.len() > 2 {
        t[1..t.len() - 1].to_string()
    } else {
        t
    };
    t.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

pub fn compact_join(tokens: &[String]) -> String {
    tokens.iter().map(|t| compact_token(t)).collect()
}

/// Compact a park reference specifically (e.g. for a `PARK_REF`/`MY_PARK_REF`
/// placeholder value). `compact_token` already strips hyphens for every
/// token, so this is currently just a named alias — kept distinct so call
/// sites read as "this is a park reference" rather than "this is some RX
/// token".
pub fn compact_park_ref(token: &str) -> String {
    compact_token(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s0_pota_accepts_required_subsequence() {
        let patterns = default_exchange_patterns();
        let ph = Placeholders { my_call: "EA3IPX".into(), ..Default::default() };
        let compact = compact_join(&["CQ".into(), "POTA".into(), "DE".into(), "EA3IPX".into(), "K".into()]);
        let tpl = &patterns.s0["POTA"][0];
        assert!(accepts(tpl, &ph, &compact));
    }

    #[test]
    fn report_template_requires_two_rst_tokens() {
        let patterns = default_exchange_patterns();
        let ph = Placeholders { other_call: "N1MM".into(), ..Default::default() };
        let tpl = &patterns.s2["report_require_call"][0];
        let good = compact_join(&["N1MM".into(), "5NN".into(), "5NN".into()]);
        let bad = compact_join(&["N1MM".into(), "5NN".into()]);
        assert!(accepts(tpl, &ph, &good));
        assert!(!accepts(tpl, &ph, &bad));
    }

    #[test]
    fn render_tx_collapses_whitespace() {
        let ph = Placeholders { tx_prosign: "KN".into(), ..Default::default() };
        let out = render_tx("{TX_PROSIGN}   UR 5NN 5NN TU 73 {TX_PROSIGN}", &ph);
        assert_eq!(out, "KN UR 5NN 5NN TU 73 KN");
    }
}
